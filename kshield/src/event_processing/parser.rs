//! Record Decoding
//!
//! A record payload is `nparams` little-endian u16 lengths followed by the
//! parameter bytes back to back. Every length is checked against what is left of
//! the payload before any slicing, so a malformed record is rejected instead of
//! producing fields out of neighbouring bytes.

use super::schema::{FieldKind, FieldSpec, SchemaRegistry};
use super::{DecodedEvent, FieldValue, RawSyscallRecord};
use crate::configuration::ExtraParams;
use crate::errors::RecordError;
use kshield_common::PARAM_LEN_SIZE;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Split `payload` into its length table and the parameter bytes that follow it.
pub fn parse_param_lengths(payload: &[u8], nparams: u32) -> Result<(Vec<u16>, &[u8]), RecordError> {
    let required = (nparams as usize)
        .checked_mul(PARAM_LEN_SIZE)
        .unwrap_or(usize::MAX);
    if payload.len() < required {
        return Err(RecordError::TruncatedParamTable {
            required,
            available: payload.len(),
        });
    }

    let (table, body) = payload.split_at(required);
    let lengths = table
        .chunks_exact(PARAM_LEN_SIZE)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok((lengths, body))
}

/// Cut `body` into one slice per length, in order.
pub fn split_params<'a>(body: &'a [u8], lengths: &[u16]) -> Result<Vec<&'a [u8]>, RecordError> {
    let mut params = Vec::with_capacity(lengths.len());
    let mut rest = body;

    for (index, &len) in lengths.iter().enumerate() {
        let len = len as usize;
        if rest.len() < len {
            return Err(RecordError::ParamUnderrun {
                index,
                required: len,
                available: rest.len(),
            });
        }
        let (param, tail) = rest.split_at(len);
        params.push(param);
        rest = tail;
    }

    Ok(params)
}

/// Decode one parameter. Integers read their leading bytes; longer params are accepted.
pub fn decode_field(index: usize, spec: &FieldSpec, raw: &[u8]) -> Result<FieldValue, RecordError> {
    let expected = spec.kind.min_len();
    if raw.len() < expected {
        return Err(RecordError::FieldTooShort {
            index,
            field: spec.name,
            expected,
            actual: raw.len(),
        });
    }

    Ok(match spec.kind {
        FieldKind::U64 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[..8]);
            FieldValue::U64(u64::from_le_bytes(bytes))
        }
        FieldKind::U32 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&raw[..4]);
            FieldValue::U32(u32::from_le_bytes(bytes))
        }
        FieldKind::Str => {
            let text = raw.strip_suffix(&[0u8]).unwrap_or(raw);
            FieldValue::Str(String::from_utf8_lossy(text).into_owned())
        }
        FieldKind::Raw => FieldValue::Bytes(raw.to_vec()),
    })
}

/// Stateless record decoder. Cheap to clone, one per worker.
#[derive(Debug, Clone, Default)]
pub struct EventDecoder {
    schemas: Arc<SchemaRegistry>,
}

impl EventDecoder {
    pub fn new(schemas: SchemaRegistry) -> Self {
        Self {
            schemas: Arc::new(schemas),
        }
    }

    pub fn decode(&self, record: &RawSyscallRecord) -> Result<DecodedEvent, RecordError> {
        let header = record.header;
        let (lengths, body) = parse_param_lengths(&record.payload, header.nparams)?;
        let params = split_params(body, &lengths)?;
        let schema = self.schemas.schema_for(header.event_type);

        let mut fields = BTreeMap::new();
        for (index, raw) in params.into_iter().enumerate() {
            match schema.field(index) {
                Some(spec) => {
                    fields.insert(spec.name.to_string(), decode_field(index, spec, raw)?);
                }
                None if schema.extra() == ExtraParams::Raw => {
                    fields.insert(format!("param_{index}"), FieldValue::Bytes(raw.to_vec()));
                }
                None => {}
            }
        }

        Ok(DecodedEvent { header, fields })
    }
}
