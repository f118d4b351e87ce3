use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProcessorError;
use crate::model::JobRecord;

/// Successful output of a processor run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOutput {
    /// Where the artifact store put the result.
    pub result_url: String,
    /// Content fingerprint of the result.
    pub result_hash: String,
    /// Tool-specific structured result.
    pub data: serde_json::Value,
}

impl ProcessorOutput {
    pub fn new(result_url: &str, result_hash: &str) -> Self {
        Self {
            result_url: result_url.to_string(),
            result_hash: result_hash.to_string(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Progress callback handed to a running processor.
pub trait ProgressSink: Send + Sync {
    /// Reports progress. Returns `Err(Cancelled)` once the job has been
    /// cancelled; the processor should stop at that point.
    fn report(&self, percent: u8, operation: &str) -> Result<(), ProcessorError>;

    fn is_cancelled(&self) -> bool;
}

pub trait Processor: Send + Sync {
    fn process(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProcessorOutput, ProcessorError>;
}

impl<F> Processor for F
where
    F: Fn(&JobRecord, &dyn ProgressSink) -> Result<ProcessorOutput, ProcessorError> + Send + Sync,
{
    fn process(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProcessorOutput, ProcessorError> {
        self(job, progress)
    }
}

/// Processors keyed by the tool name they serve.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool_name: &str, processor: Arc<dyn Processor>) {
        if self
            .processors
            .insert(tool_name.to_string(), processor)
            .is_some()
        {
            log::warn!("Replacing processor registered for tool '{}'", tool_name);
        }
    }

    pub fn with(mut self, tool_name: &str, processor: impl Processor + 'static) -> Self {
        self.register(tool_name, Arc::new(processor));
        self
    }

    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(tool_name).cloned()
    }

    pub fn tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.processors.keys().cloned().collect();
        tools.sort();
        tools
    }

    /// Runs the processor registered for `job.tool_name`.
    pub fn process(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProcessorOutput, ProcessorError> {
        let processor = self
            .get(&job.tool_name)
            .ok_or_else(|| ProcessorError::UnsupportedTool(job.tool_name.clone()))?;
        processor.process(job, progress)
    }
}
