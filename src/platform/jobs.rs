// projectrestore/src/platform/jobs.rs
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Asynchronous Storage API job as returned by `/v2/storage/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Succeeded(Option<Value>),
    Failed(String),
}

impl Job {
    pub fn state(&self) -> JobState {
        match self.status.as_str() {
            "success" => JobState::Succeeded(self.results.clone()),
            "error" => {
                let message = match &self.error {
                    Some(JobError { code: Some(code), message }) => format!("{} ({})", message, code),
                    Some(JobError { message, .. }) => message.clone(),
                    None => "job finished with error".to_string(),
                };
                JobState::Failed(message)
            }
            _ => JobState::Pending,
        }
    }
}

/// Pulls the created object id out of finished job results.
pub fn result_id(results: &Option<Value>) -> Option<String> {
    match results.as_ref()?.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
