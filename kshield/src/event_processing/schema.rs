//! Parameter schemas
//!
//! A schema names and types the parameters of one event type by position. The
//! registry falls back to the positional open/openat layout for event types
//! without a schema of their own.

use crate::configuration::{Decode, ExtraParams, IntWidth};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U64,
    U32,
    /// NUL-terminated string. The terminator is stripped if present.
    Str,
    Raw,
}

impl FieldKind {
    /// Bytes a parameter must carry to be decoded as this kind.
    pub fn min_len(self) -> usize {
        match self {
            FieldKind::U64 => 8,
            FieldKind::U32 => 4,
            FieldKind::Str | FieldKind::Raw => 0,
        }
    }
}

impl From<IntWidth> for FieldKind {
    fn from(width: IntWidth) -> Self {
        match width {
            IntWidth::U32 => FieldKind::U32,
            IntWidth::U64 => FieldKind::U64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSchema {
    fields: Vec<FieldSpec>,
    extra: ExtraParams,
}

impl ParamSchema {
    pub fn new(fields: Vec<FieldSpec>, extra: ExtraParams) -> Self {
        Self { fields, extra }
    }

    /// fd, dirfd, name, flags, mode, dev
    pub fn positional(dirfd: IntWidth, extra: ExtraParams) -> Self {
        Self::new(
            vec![
                FieldSpec::new("fd", FieldKind::U64),
                FieldSpec::new("dirfd", dirfd.into()),
                FieldSpec::new("name", FieldKind::Str),
                FieldSpec::new("flags", FieldKind::U32),
                FieldSpec::new("mode", FieldKind::U32),
                FieldSpec::new("dev", FieldKind::U32),
            ],
            extra,
        )
    }

    pub fn field(&self, index: usize) -> Option<&FieldSpec> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn extra(&self) -> ExtraParams {
        self.extra
    }
}

impl Default for ParamSchema {
    fn default() -> Self {
        Self::positional(IntWidth::default(), ExtraParams::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    fallback: ParamSchema,
    by_event_type: HashMap<u16, ParamSchema>,
}

impl SchemaRegistry {
    pub fn new(fallback: ParamSchema) -> Self {
        Self {
            fallback,
            by_event_type: HashMap::new(),
        }
    }

    pub fn from_config(decode: &Decode) -> Self {
        Self::new(ParamSchema::positional(
            decode.dirfd_width,
            decode.extra_params,
        ))
    }

    pub fn with_event_schema(mut self, event_type: u16, schema: ParamSchema) -> Self {
        self.by_event_type.insert(event_type, schema);
        self
    }

    pub fn schema_for(&self, event_type: u16) -> &ParamSchema {
        self.by_event_type.get(&event_type).unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_lay_out_positional_fields() {
        let schema = ParamSchema::default();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name).collect();

        assert_eq!(names, ["fd", "dirfd", "name", "flags", "mode", "dev"]);
        assert_eq!(schema.field(2).map(|f| f.kind), Some(FieldKind::Str));
        assert_eq!(schema.field(6), None);
    }

    #[test]
    fn should_follow_configured_dirfd_width() {
        let decode = Decode {
            dirfd_width: IntWidth::U32,
            extra_params: ExtraParams::Raw,
        };

        let registry = SchemaRegistry::from_config(&decode);
        let schema = registry.schema_for(0);

        assert_eq!(schema.field(1).map(|f| f.kind), Some(FieldKind::U32));
        assert_eq!(schema.extra(), ExtraParams::Raw);
    }

    #[test]
    fn should_prefer_event_specific_schema() {
        let custom = ParamSchema::new(vec![FieldSpec::new("res", FieldKind::U64)], ExtraParams::Drop);
        let registry = SchemaRegistry::default().with_event_schema(7, custom.clone());

        assert_eq!(registry.schema_for(7), &custom);
        assert_eq!(registry.schema_for(8), &ParamSchema::default());
    }
}
