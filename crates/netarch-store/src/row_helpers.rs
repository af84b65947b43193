use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Current time in the sortable form stored in `created_at` columns.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netarch_core::Module;

    #[test]
    fn parse_enum_success() {
        let module: Module = parse_enum("inquiry", "conversations", "module").unwrap();
        assert_eq!(module, Module::Inquiry);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Module, _> = parse_enum("s1", "conversations", "module");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "conversations", column: "module", .. })
        ));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(a < b, "{a} !< {b}");
        assert!(a.ends_with('Z'));
    }
}
