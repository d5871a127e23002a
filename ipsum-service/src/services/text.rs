/// Remove every `*`; models like to add markdown emphasis to filler text.
pub fn strip_asterisks(text: &str) -> String {
    text.replace('*', "")
}

/// Final cleanup for a buffered completion. Asterisks go first so that
/// whitespace they were wrapping is trimmed too.
pub fn clean_completion(text: &str) -> String {
    strip_asterisks(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_all_asterisks() {
        assert_eq!(strip_asterisks("**Bold** and *soft*"), "Bold and soft");
        assert_eq!(strip_asterisks("***"), "");
    }

    #[test]
    fn clean_completion_trims_and_strips() {
        let cleaned = clean_completion("\n  *Lorem* ipsum galactica.  \n");
        assert_eq!(cleaned, "Lorem ipsum galactica.");
        assert!(!cleaned.contains('*'));
        assert_eq!(clean_completion("* Nebula drift *"), "Nebula drift");
    }
}
