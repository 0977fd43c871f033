//! Optional JSON-lines session trace. One event per line plus counters
//! summarized at close; cheap enough to leave on for long-lived spool
//! sessions.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug)]
pub(crate) struct Trace {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl Trace {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            counters: HashMap::new(),
        })
    }

    pub fn log_json(&mut self, json: &str) {
        let _ = writeln!(self.writer, "{json}");
    }

    pub fn event(&mut self, kind: &str, fields: &[(&str, u64)]) {
        let mut out = format!("{{\"type\":\"{}\"", json_escape(kind));
        for (key, value) in fields {
            out.push_str(&format!(",\"{}\":{}", json_escape(key), value));
        }
        out.push('}');
        self.log_json(&out);
    }

    pub fn increment(&mut self, key: &str, amount: u64) {
        let entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn emit_summary(&mut self, context: &str) {
        let mut counters: Vec<(String, u64)> = self.counters.drain().collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        let mut counts = String::from("{");
        for (idx, (key, value)) in counters.iter().enumerate() {
            if idx > 0 {
                counts.push(',');
            }
            counts.push_str(&format!("\"{}\":{}", json_escape(key), value));
        }
        counts.push('}');
        let json = format!(
            "{{\"type\":\"trace.summary\",\"context\":\"{}\",\"counts\":{}}}",
            json_escape(context),
            counts
        );
        self.log_json(&json);
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
