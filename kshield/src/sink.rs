//! Event sinks
//!
//! Decoded events leave the pipeline through an [`EventSink`]. The console sink
//! renders them with an [`OutputStrategy`]; the policy sink submits them to a
//! [`PolicyEvaluator`] and logs the verdict.

use crate::configuration::{Output, OutputFormat};
use crate::event_processing::{DecodedEvent, FieldValue};
use crate::policy::{Decision, PolicyEvaluator};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::fmt;
use std::fmt::Write as FmtWrite;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn accept(&self, event: DecodedEvent) -> anyhow::Result<()>;
}

pub trait OutputStrategy: Send + Sync {
    fn format_event(&self, event: &DecodedEvent) -> String;
    fn format_header(&self) -> String;
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::U64(v) => write!(f, "{v}"),
            FieldValue::U32(v) => write!(f, "{v}"),
            FieldValue::Str(s) => write!(f, "{s:?}"),
            FieldValue::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

pub struct JsonOutputStrategy;

impl OutputStrategy for JsonOutputStrategy {
    fn format_event(&self, event: &DecodedEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_header(&self) -> String {
        "".to_string() // JSON doesn't need headers
    }
}

pub struct PlainTextOutputStrategy {
    verbose: bool,
}

impl PlainTextOutputStrategy {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl OutputStrategy for PlainTextOutputStrategy {
    fn format_event(&self, event: &DecodedEvent) -> String {
        let header = &event.header;
        let mut line = if self.verbose {
            format!(
                "[{}] type={} tid={} len={} nparams={}",
                header.ts, header.event_type, header.tid, header.len, header.nparams
            )
        } else {
            format!("type={} tid={}", header.event_type, header.tid)
        };

        for (name, value) in &event.fields {
            let _ = write!(line, " {name}={value}");
        }
        line
    }

    fn format_header(&self) -> String {
        if self.verbose {
            "kshield syscall monitor - verbose mode".to_string()
        } else {
            "kshield syscall monitor".to_string()
        }
    }
}

/// Prints every event to stdout.
pub struct ConsoleSink {
    strategy: Box<dyn OutputStrategy>,
}

impl ConsoleSink {
    pub fn new(strategy: Box<dyn OutputStrategy>) -> Self {
        Self { strategy }
    }

    pub fn from_config(output: &Output) -> Self {
        match output.format {
            OutputFormat::Json => Self::new(Box::new(JsonOutputStrategy)),
            OutputFormat::Plain => Self::new(Box::new(PlainTextOutputStrategy::new(output.verbose))),
        }
    }

    pub fn header(&self) -> String {
        self.strategy.format_header()
    }

    pub fn render(&self, event: &DecodedEvent) -> String {
        self.strategy.format_event(event)
    }
}

#[async_trait]
impl EventSink for ConsoleSink {
    async fn accept(&self, event: DecodedEvent) -> anyhow::Result<()> {
        println!("{}", self.render(&event));
        Ok(())
    }
}

/// Forwards events to a policy engine. A failed submission fails only that event.
pub struct PolicySink<E> {
    evaluator: E,
}

impl<E: PolicyEvaluator> PolicySink<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }
}

#[async_trait]
impl<E: PolicyEvaluator> EventSink for PolicySink<E> {
    async fn accept(&self, event: DecodedEvent) -> anyhow::Result<()> {
        let decision = self.evaluator.submit_event(&event).await?;
        let header = &event.header;

        match decision {
            Decision::Allow => debug!("allow type={} tid={}", header.event_type, header.tid),
            Decision::Deny { reasons } if reasons.is_empty() => {
                info!("deny type={} tid={}", header.event_type, header.tid)
            }
            Decision::Deny { reasons } => info!(
                "deny type={} tid={}: {}",
                header.event_type,
                header.tid,
                reasons.join("; ")
            ),
            Decision::Undefined => warn!(
                "policy returned no decision for type={} tid={}",
                header.event_type, header.tid
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PolicyError;
    use kshield_common::PerfEventHeader;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn open_event() -> DecodedEvent {
        let mut fields = BTreeMap::new();
        fields.insert("fd".to_string(), FieldValue::U64(3));
        fields.insert("name".to_string(), FieldValue::Str("/tmp/x".to_string()));
        DecodedEvent {
            header: PerfEventHeader::new(1000, 42, 60, 5, 3),
            fields,
        }
    }

    mod formatting {
        use super::*;

        #[test]
        fn should_render_plain_fields_in_name_order() {
            let strategy = PlainTextOutputStrategy::new(false);

            assert_eq!(
                strategy.format_event(&open_event()),
                "type=5 tid=42 fd=3 name=\"/tmp/x\""
            );
        }

        #[test]
        fn should_include_header_details_when_verbose() {
            let strategy = PlainTextOutputStrategy::new(true);

            let line = strategy.format_event(&open_event());

            assert!(line.starts_with("[1000] type=5 tid=42 len=60 nparams=3"));
            assert!(strategy.format_header().contains("verbose"));
        }

        #[test]
        fn should_render_json_with_flattened_header() {
            let json = JsonOutputStrategy.format_event(&open_event());
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();

            assert_eq!(value["tid"], 42);
            assert_eq!(value["type"], 5);
            assert_eq!(value["fields"]["name"], "/tmp/x");
        }

        #[test]
        fn should_render_raw_bytes_as_hex() {
            assert_eq!(FieldValue::Bytes(vec![0xde, 0x01]).to_string(), "0xde01");
        }

        #[test]
        fn should_pick_strategy_from_config() {
            let sink = ConsoleSink::from_config(&Output {
                format: OutputFormat::Json,
                ..Output::default()
            });

            assert!(sink.render(&open_event()).starts_with('{'));
            assert_eq!(sink.header(), "");
        }
    }

    struct ScriptedEvaluator {
        decision: Option<Decision>,
        submitted: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl PolicyEvaluator for ScriptedEvaluator {
        async fn submit_event(&self, event: &DecodedEvent) -> Result<Decision, PolicyError> {
            self.submitted.lock().unwrap().push(event.header.tid);
            self.decision
                .clone()
                .ok_or_else(|| PolicyError::InvalidResponse("down".to_string()))
        }
    }

    #[tokio::test]
    async fn should_submit_each_event_to_evaluator() {
        let sink = PolicySink::new(ScriptedEvaluator {
            decision: Some(Decision::Deny {
                reasons: vec!["tmp write".to_string()],
            }),
            submitted: Mutex::new(Vec::new()),
        });

        sink.accept(open_event()).await.unwrap();

        assert_eq!(*sink.evaluator().submitted.lock().unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn should_fail_event_when_evaluator_fails() {
        let sink = PolicySink::new(ScriptedEvaluator {
            decision: None,
            submitted: Mutex::new(Vec::new()),
        });

        let result = sink.accept(open_event()).await;

        assert!(result.unwrap_err().to_string().contains("down"));
    }
}
