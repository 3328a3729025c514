//! Static mapping between API table keys and dump table names.
//!
//! The schema endpoint keys most tables by their dump name, but a handful
//! are keyed by a shorter name. The list is maintained by hand and goes
//! stale if the API introduces new aliases.

/// `(api key, dump table name)` pairs.
pub const TABLE_ALIASES: &[(&str, &str)] = &[
    ("account", "account_dim"),
    ("assignment", "assignment_dim"),
    ("course", "course_dim"),
    ("course_section", "course_section_dim"),
    ("enrollment", "enrollment_dim"),
    ("enrollment_term", "enrollment_term_dim"),
    ("role", "role_dim"),
    ("user", "user_dim"),
];

/// Name the dump files use for `name`, which may be either spelling.
pub fn dump_table_name(name: &str) -> &str {
    TABLE_ALIASES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, table)| *table)
        .unwrap_or(name)
}

/// Key the schema endpoint uses for `name`, which may be either spelling.
pub fn api_table_key(name: &str) -> &str {
    TABLE_ALIASES
        .iter()
        .find(|(_, table)| *table == name)
        .map(|(key, _)| *key)
        .unwrap_or(name)
}
