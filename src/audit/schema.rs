//! Back-compatible log schema handling.
//!
//! Older log stores lack columns that newer entries carry. Entries are
//! cut down to what the configured schema version holds; extra fields
//! are dropped silently rather than failing the write.
//!
//! | field            | v1 | v2 | v3 |
//! |------------------|----|----|----|
//! | base fields      | ✓  | ✓  | ✓  |
//! | `request_method` |    | ✓  | ✓  |
//! | `http_code`      |    | ✓  | ✓  |
//! | `sent_to`        |    | ✓  | ✓  |
//! | `rule_id`        |    | ✓  | ✓  |
//! | `domain`         |    |    | ✓  |
//! | `request_data`   |    |    | ✓  |
//! | `redirect_by`    |    |    | ✓  |

pub use crate::config::LogSchema;

use crate::audit::entry::LogEntry;

/// Drop every field `schema` does not support.
pub fn restrict(mut entry: LogEntry, schema: LogSchema) -> LogEntry {
    if schema < LogSchema::V3 {
        entry.domain = None;
        entry.request_data = None;
        entry.redirect_by = None;
    }
    if schema < LogSchema::V2 {
        entry.request_method = None;
        entry.http_code = None;
        entry.sent_to = None;
        entry.rule_id = None;
    }
    entry
}
