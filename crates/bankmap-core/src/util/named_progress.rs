use indicatif::ProgressStyle;

/// Extension trait for progress bar styles carrying a left-aligned label.
pub trait NamedProgress {
    /// Creates a bar style with `name` padded to a fixed-width column.
    fn named_bar(name: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str) -> Self {
        let fmt = format!(
            "{:<31}{{wide_bar:40.cyan/blue}} {{pos:>4}}/{{len:<4}} [{{elapsed_precise}} ({{eta}} remaining)] {{msg}}",
            name
        );
        ProgressStyle::default_bar()
            .template(&fmt)
            .unwrap_or(ProgressStyle::default_bar())
    }
}
