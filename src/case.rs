//! Identifier conversion for derived column and table names.

/// Convert a type or field identifier to snake_case. Acronym runs stay together:
/// "UserID" -> "user_id", "IP" -> "ip", "LatencyMs" -> "latency_ms".
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                // end of an acronym run: "HTTPServer" -> "http_server"
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural of a snake_case noun, applied to its last segment.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    let ends_with_consonant_y = lower.ends_with('y')
        && lower
            .chars()
            .rev()
            .nth(1)
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false);
    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Default table name for a model type: pluralized snake_case ("ActivityLog" -> "activity_logs").
pub fn table_name_for(type_name: &str) -> String {
    pluralize(&to_snake_case(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_keeps_acronyms_together() {
        assert_eq!(to_snake_case("ID"), "id");
        assert_eq!(to_snake_case("UserID"), "user_id");
        assert_eq!(to_snake_case("UserAgent"), "user_agent");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("created_at"), "created_at");
    }

    #[test]
    fn table_names_are_plural() {
        assert_eq!(table_name_for("User"), "users");
        assert_eq!(table_name_for("ActivityLog"), "activity_logs");
        assert_eq!(table_name_for("Category"), "categories");
        assert_eq!(table_name_for("Address"), "addresses");
        assert_eq!(table_name_for("Day"), "days");
    }
}
