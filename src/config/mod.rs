pub mod options;

pub use options::{Action, Dependent, FieldEntry, FieldsOption, PrefixMapOption, ReplicateOptions, SourceColumns};

/// Target lookup column used when `key` is not given
pub const DEFAULT_KEY: &str = "id";

/// Primary key column of every replicated target table
pub const TARGET_ID_COLUMN: &str = "id";

/// Primary key column of source tables, joined against the through key
pub const SOURCE_ID_COLUMN: &str = "id";

/// PL/pgSQL record bound to the changed row (OLD on delete, NEW otherwise)
pub const ROW_VAR: &str = "ROW";

/// PL/pgSQL record iterated over the through relation
pub const THROUGH_VAR: &str = "THROUGH";

/// Creation timestamp column written when `timestamps` is set
pub const CREATED_AT_COLUMN: &str = "created_at";

/// Modification timestamp column written when `timestamps` is set
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Version tag mixed into derived trigger names; bump when the canonical form changes
pub const NAME_HASH_VERSION: &str = "pg_replicate/name/v1";

/// Hex digits of the name hash kept in derived names
pub const NAME_HASH_LEN: usize = 8;
