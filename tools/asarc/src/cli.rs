//! Command-line argument cursor, mirroring the console argument parser this
//! tool's build commands are grounded on: a flat `Vec<String>` with a
//! single read cursor, no external argument-parsing crate.

/// A cursor over the process's argument list (excluding `argv[0]`).
pub struct Args {
    items: Vec<String>,
    next: usize,
}

impl Args {
    /// Wraps an argument list.
    #[must_use]
    pub fn new(items: Vec<String>) -> Self {
        Self { items, next: 0 }
    }

    /// Consumes and returns the next argument, or an empty string if none remain.
    pub fn next(&mut self) -> String {
        let value = self.items.get(self.next).cloned().unwrap_or_default();
        if self.next < self.items.len() {
            self.next += 1;
        }
        value
    }

    /// Returns the next argument without consuming it.
    #[must_use]
    pub fn peek(&self) -> String {
        self.items.get(self.next).cloned().unwrap_or_default()
    }

    /// `true` if at least `count` more arguments remain.
    #[must_use]
    pub fn has(&self, count: usize) -> bool {
        self.next + count <= self.items.len()
    }

    /// Consumes a run of plain (non-flag) arguments, stopping at the first
    /// argument starting with `-` or at the end of the list.
    pub fn take_input_list(&mut self) -> Vec<String> {
        let mut result = Vec::new();
        while self.has(1) {
            let arg = self.peek();
            if arg.is_empty() || arg.starts_with('-') {
                break;
            }
            result.push(self.next());
        }
        result
    }

    /// Consumes and returns the next argument, interpreted as `on`/`off`.
    pub fn take_on_off(&mut self) -> bool {
        self.next() == "on"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_list_stops_at_the_next_flag() {
        let mut args = Args::new(vec!["a.png".into(), "b.png".into(), "-t".into()]);
        assert_eq!(args.take_input_list(), vec!["a.png", "b.png"]);
        assert_eq!(args.next(), "-t");
    }

    #[test]
    fn has_reports_remaining_argument_count() {
        let mut args = Args::new(vec!["one".into(), "two".into()]);
        assert!(args.has(2));
        assert!(!args.has(3));
        args.next();
        assert!(!args.has(2));
    }
}
