use clap::ValueEnum;
use jobmatch_vector_store::CollectionKind;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum CollectionFlag {
    Anchors,
    Postings,
}

impl CollectionFlag {
    pub(crate) const fn as_domain(self) -> CollectionKind {
        match self {
            CollectionFlag::Anchors => CollectionKind::Anchors,
            CollectionFlag::Postings => CollectionKind::Postings,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum RebuildTarget {
    Anchors,
    Postings,
    All,
}

impl RebuildTarget {
    pub(crate) fn kinds(self) -> Vec<CollectionKind> {
        match self {
            RebuildTarget::Anchors => vec![CollectionKind::Anchors],
            RebuildTarget::Postings => vec![CollectionKind::Postings],
            RebuildTarget::All => CollectionKind::ALL.to_vec(),
        }
    }
}
