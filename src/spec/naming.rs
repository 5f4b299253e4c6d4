//! Stable names for generated database objects
//!
//! Several rules may replicate the same source into the same target (for
//! example with different conditions), so the derived name carries a short
//! hash of the rule. The hash is SHA-256 over a versioned canonical JSON
//! rendering of the normalized rule:
//!
//! ```text
//! sha256("pg_replicate/name/v1" "\n" canonical_json)[..8 hex digits]
//! ```
//!
//! The canonical form is defined here, independent of `TriggerSpec`'s layout,
//! and excludes the action so every action of one rule addresses the same
//! function. Changing it requires bumping `NAME_HASH_VERSION`.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{MAX_IDENTIFIER_LEN, NAME_HASH_LEN, NAME_HASH_VERSION};
use crate::error::{ReplicateError, ReplicateResult};
use crate::spec::{Routing, TriggerSpec};

#[derive(Serialize)]
struct CanonicalRule<'a> {
    source: &'a str,
    target: &'a str,
    key: String,
    through: Option<String>,
    condition: Option<&'a str>,
    discriminator: Option<String>,
    static_prefix: Option<&'a str>,
    branches: Vec<(&'a str, &'a str)>,
    fields: Vec<CanonicalField<'a>>,
    timestamps: bool,
    dependent_destroy: bool,
    coalesce: bool,
    upsert: bool,
    propagate_keys: bool,
}

#[derive(Serialize)]
struct CanonicalField<'a> {
    from: Vec<String>,
    to: &'a str,
}

impl<'a> CanonicalRule<'a> {
    fn of(spec: &'a TriggerSpec) -> Self {
        let (discriminator, static_prefix, branches) = match spec.routing() {
            Routing::Unprefixed => (None, None, Vec::new()),
            Routing::Static { prefix } => (None, Some(prefix.as_str()), Vec::new()),
            Routing::Discriminated {
                discriminator,
                branches,
            } => (
                Some(discriminator.to_string()),
                None,
                branches
                    .iter()
                    .map(|b| (b.value.as_str(), b.prefix.as_str()))
                    .collect(),
            ),
        };

        Self {
            source: spec.source_table(),
            target: spec.target_table(),
            key: spec.key().to_string(),
            through: spec.through().map(|t| t.to_string()),
            condition: spec.condition(),
            discriminator,
            static_prefix,
            branches,
            fields: spec
                .fields()
                .iter()
                .map(|m| CanonicalField {
                    from: m.sources.iter().map(|s| s.to_string()).collect(),
                    to: m.target.as_str(),
                })
                .collect(),
            timestamps: spec.timestamps(),
            dependent_destroy: spec.dependent_destroy(),
            coalesce: spec.coalesce(),
            upsert: spec.upsert(),
            propagate_keys: spec.propagate_keys(),
        }
    }
}

/// Hex digest identifying a rule, `NAME_HASH_LEN` characters long
pub fn rule_hash(spec: &TriggerSpec) -> ReplicateResult<String> {
    let canonical = serde_json::to_string(&CanonicalRule::of(spec)).map_err(|e| {
        ReplicateError::SerializationError {
            message: format!("canonical rule for '{}': {}", spec.source_table(), e),
        }
    })?;

    Ok(short_digest(canonical.as_bytes()))
}

/// First `NAME_HASH_LEN` hex digits of the versioned SHA-256 of `input`
fn short_digest(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(NAME_HASH_VERSION.as_bytes());
    hasher.update(b"\n");
    hasher.update(input);
    let digest = hasher.finalize();

    let mut hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
    hex.truncate(NAME_HASH_LEN);
    hex
}

/// `replicate_{source}_to_{target}_{hash}`, bounded to the identifier limit
pub fn derived_name(spec: &TriggerSpec) -> ReplicateResult<String> {
    let base = format!(
        "replicate_{}_to_{}",
        flatten(spec.source_table()),
        flatten(spec.target_table())
    );
    Ok(bounded(&base, &rule_hash(spec)?))
}

/// `{base}_{suffix}`, shortening `base` so the result fits in 63 bytes
pub fn bounded(base: &str, suffix: &str) -> String {
    let room = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len() + 1);
    let mut cut = base.len().min(room);
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", base[..cut].trim_end_matches('_'), suffix)
}

/// `{name}_{suffix}` for objects derived from an existing name
///
/// Unlike `bounded`, the tail of `name` may carry the rule hash, so an
/// over-long result is not simply cut: the readable head is kept and
/// followed by a hash of the full `{name}_{suffix}`, then `suffix` when it
/// still fits. Distinct inputs keep distinct names.
pub fn derived_object_name(name: &str, suffix: &str) -> String {
    let full = format!("{}_{}", name, suffix);
    if full.len() <= MAX_IDENTIFIER_LEN {
        return full;
    }

    let digest = short_digest(full.as_bytes());
    let tail = if digest.len() + suffix.len() + 2 <= MAX_IDENTIFIER_LEN {
        format!("{}_{}", digest, suffix)
    } else {
        digest
    };
    bounded(name, &tail)
}

/// Schema-qualified tables contribute `schema_table` to names
fn flatten(table: &str) -> String {
    table.replace('.', "_")
}
