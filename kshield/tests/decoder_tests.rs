//! Tests for decoding record parameters into named fields


use assert_matches::assert_matches;
use bytes::Bytes;
use kshield::configuration::{Decode, ExtraParams, IntWidth};
use kshield::errors::RecordError;
use kshield::event_processing::{
    EventDecoder, FieldValue, RawChunk, RawSyscallRecord, RecordReassembler, SchemaRegistry,
};
use kshield_common::{PerfEventHeader, PERF_EVENT_HEADER_SIZE};
use test_helpers::{records, RecordBuilder};

fn reassemble(bytes: Vec<u8>) -> RawSyscallRecord {
    let mut reassembler = RecordReassembler::new(4096);
    let mut out = Vec::new();
    reassembler.push(RawChunk::new(0, bytes), &mut out).unwrap();
    out.remove(0)
}

mod positional_schema {
    use super::*;

    #[test]
    fn should_decode_name_from_third_param() {
        let bytes = RecordBuilder::new()
            .u64_param(4)
            .u64_param(5)
            .param(b"foo\0")
            .build();
        let record = reassemble(bytes);

        let event = EventDecoder::default().decode(&record).unwrap();

        assert_eq!(event.header.nparams, 3);
        assert_eq!(event.field("name"), Some(&FieldValue::Str("foo".to_string())));
        assert_eq!(event.field("fd"), Some(&FieldValue::U64(4)));
        assert_eq!(event.field("dirfd"), Some(&FieldValue::U64(5)));
        assert_eq!(event.fields.len(), 3);
    }

    #[test]
    fn should_decode_full_open_record() {
        let event = EventDecoder::default()
            .decode(&reassemble(records::open_of(9, "/etc/shadow")))
            .unwrap();

        assert_eq!(event.header.tid, 9);
        assert_eq!(event.field("name"), Some(&FieldValue::Str("/etc/shadow".to_string())));
        assert_eq!(event.field("mode"), Some(&FieldValue::U32(0o644)));
        assert_eq!(event.field("dev"), Some(&FieldValue::U32(8)));
    }

    #[test]
    fn should_read_narrow_dirfd_when_configured() {
        let decoder = EventDecoder::new(SchemaRegistry::from_config(&Decode {
            dirfd_width: IntWidth::U32,
            extra_params: ExtraParams::Drop,
        }));
        let bytes = RecordBuilder::new().u64_param(1).u32_param(7).build();

        let event = decoder.decode(&reassemble(bytes)).unwrap();

        assert_eq!(event.field("dirfd"), Some(&FieldValue::U32(7)));
    }

    #[test]
    fn should_produce_no_fields_without_params() {
        let event = EventDecoder::default()
            .decode(&reassemble(RecordBuilder::new().build()))
            .unwrap();

        assert!(event.fields.is_empty());
    }
}

mod malformed_records {
    use super::*;

    fn record_with(nparams: u32, payload: Vec<u8>) -> RawSyscallRecord {
        let len = (PERF_EVENT_HEADER_SIZE + payload.len()) as u32;
        RawSyscallRecord {
            header: PerfEventHeader::new(0, 1, len, 5, nparams),
            payload: Bytes::from(payload),
        }
    }

    #[test]
    fn should_reject_lengths_running_past_payload() {
        // three params of 8 bytes declared, only 10 bytes of data
        let mut payload = Vec::new();
        for _ in 0..3 {
            payload.extend_from_slice(&8u16.to_le_bytes());
        }
        payload.extend_from_slice(&[0; 10]);

        let result = EventDecoder::default().decode(&record_with(3, payload));

        assert_matches!(result, Err(RecordError::ParamUnderrun { index: 1, required: 8, available: 2 }));
    }

    #[test]
    fn should_reject_missing_length_table() {
        let result = EventDecoder::default().decode(&record_with(4, vec![1, 0, 2]));

        assert_matches!(result, Err(RecordError::TruncatedParamTable { required: 8, available: 3 }));
    }

    #[test]
    fn should_reject_absurd_param_count_without_allocating() {
        let result = EventDecoder::default().decode(&record_with(u32::MAX, vec![0; 16]));

        assert_matches!(result, Err(RecordError::TruncatedParamTable { .. }));
    }
}

#[test]
fn should_decode_identically_every_time() {
    let record = reassemble(records::open_of(5, "/var/log/syslog"));
    let decoder = EventDecoder::default();

    let first = decoder.decode(&record).unwrap();
    let second = decoder.clone().decode(&record).unwrap();

    assert_eq!(first, second);
}
