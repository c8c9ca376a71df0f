/// Record sinks — where a finished batch of essays is written.
use std::path::PathBuf;
use thiserror::Error;

use crate::schema::essay::{topic_slug, EssayRecord, EssayStatus};
use crate::store::{write_atomically, RecordStore, RowFields, StoreError};

/// Columns of the tabular export, in order.
pub const CSV_HEADER: [&str; 8] = [
    "essay_id",
    "title",
    "subject",
    "grade",
    "knowledge level",
    "grammar level",
    "flow level",
    "essay",
];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Accepts a completed batch of records for one topic.
pub trait RecordSink {
    fn write_batch(&mut self, topic: &str, records: &[EssayRecord]) -> Result<(), SinkError>;
}

/// Writes `essays_<topic>.py`, one `essay_<topic>_<i> = """..."""`
/// assignment per record.
#[derive(Debug, Clone)]
pub struct ScriptSink {
    dir: PathBuf,
}

impl ScriptSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("essays_{}.py", topic_slug(topic)))
    }
}

/// Escape text for a triple-quoted block.
fn escape_block(text: &str) -> String {
    text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

pub fn render_script(topic: &str, records: &[EssayRecord]) -> String {
    let slug = topic_slug(topic);
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!(
            "essay_{slug}_{i} = \"\"\"{}\"\"\"\n\n",
            escape_block(&record.essay_text)
        ));
    }
    out
}

impl RecordSink for ScriptSink {
    fn write_batch(&mut self, topic: &str, records: &[EssayRecord]) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(topic);
        write_atomically(&path, render_script(topic, records).as_bytes())?;
        tracing::info!(count = records.len(), path = %path.display(), "wrote essays");
        Ok(())
    }
}

/// Writes `essays_<topic>.csv` with one row per record.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("essays_{}.csv", topic_slug(topic)))
    }
}

pub fn render_csv(records: &[EssayRecord]) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for r in records {
        let levels = r.competency.levels;
        writer.write_record([
            r.id.to_string(),
            r.topic.clone(),
            r.subject.clone(),
            r.grade.clone(),
            levels.knowledge.to_string(),
            levels.grammar.to_string(),
            levels.flow.to_string(),
            r.essay_text.clone(),
        ])?;
    }
    writer.into_inner().map_err(|e| {
        let err = e.error();
        SinkError::Io(std::io::Error::new(err.kind(), err.to_string()))
    })
}

impl RecordSink for CsvSink {
    fn write_batch(&mut self, topic: &str, records: &[EssayRecord]) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(topic);
        write_atomically(&path, &render_csv(records)?)?;
        tracing::info!(count = records.len(), path = %path.display(), "wrote essays");
        Ok(())
    }
}

/// Upserts each record into a record-store table, then saves the store.
///
/// Only columns the table declares are written, so a narrower schema
/// simply drops the fields it has no room for.
pub struct StoreSink<'a> {
    store: &'a mut RecordStore,
    table: String,
}

impl<'a> StoreSink<'a> {
    pub fn new(store: &'a mut RecordStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

/// Row fields for a record, named after the `samples` table columns.
pub fn record_fields(record: &EssayRecord) -> RowFields {
    let levels = record.competency.levels;
    let status = match &record.status {
        EssayStatus::Generated => "generated".to_string(),
        EssayStatus::Failed { reason } => format!("failed: {reason}"),
    };
    [
        ("sample_id", record.id.to_string()),
        ("essay_text", record.essay_text.clone()),
        ("grade_level", record.grade.clone()),
        ("subject", record.subject.clone()),
        ("topic", record.topic.clone()),
        ("prompt", record.prompt.clone()),
        ("content_level", levels.knowledge.to_string()),
        ("grammar_level", levels.grammar.to_string()),
        ("flow_level", levels.flow.to_string()),
        ("model", record.model.clone()),
        ("status", status),
        ("created_ts", record.created_ts.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Some(v)))
    .collect()
}

impl RecordSink for StoreSink<'_> {
    fn write_batch(&mut self, _topic: &str, records: &[EssayRecord]) -> Result<(), SinkError> {
        let declared = self.store.table(&self.table)?.columns.clone();
        for record in records {
            let mut fields = record_fields(record);
            fields.retain(|name, _| declared.iter().any(|c| c.eq_ignore_ascii_case(name)));
            self.store.upsert(&self.table, &fields)?;
        }
        self.store.save_all()?;
        tracing::info!(count = records.len(), table = %self.table, "stored essays");
        Ok(())
    }
}
