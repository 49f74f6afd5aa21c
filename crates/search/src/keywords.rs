/// Fraction of `keywords` that occur in `text`, case-insensitively.
///
/// Blank keywords are ignored; no keywords means no overlap.
#[must_use]
pub fn keyword_overlap(text: &str, keywords: &[String]) -> f32 {
    let haystack = text.to_lowercase();
    let mut total = 0usize;
    let mut hits = 0usize;
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        total += 1;
        if haystack.contains(&needle) {
            hits += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        hits as f32 / total as f32
    }
}
