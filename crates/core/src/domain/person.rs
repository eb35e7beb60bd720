use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Profile of the represented person plus the assistant persona. Loaded once
/// at startup and treated as read-only for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonContext {
    pub assistant: AssistantIdentity,
    pub professional: Professional,
    pub information: Identity,
    pub preferences: Preferences,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub experience_years: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobSearchStatus {
    Active,
    Passive,
    NotLooking,
}

impl JobSearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passive => "passive",
            Self::NotLooking => "not-looking",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Professional {
    pub current_role: String,
    pub company: String,
    pub skills: Vec<Skill>,
    pub experience_years: u32,
    pub current_routine: String,
    pub job_search_status: JobSearchStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub open_to_relocation: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub location: Location,
    pub resume_url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub min_salary: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_salary: Option<u32>,
    pub location: String,
    pub remote_work: bool,
}

#[derive(Debug, Error)]
pub enum PersonLoadError {
    #[error("could not read person profile `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse person profile `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
}

impl PersonContext {
    pub fn load(path: &Path) -> Result<Self, PersonLoadError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| PersonLoadError::ReadFile { path: path.to_path_buf(), source })?;
        toml::from_str(&raw)
            .map_err(|source| PersonLoadError::ParseFile { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{JobSearchStatus, PersonContext};

    const PROFILE: &str = r#"
[assistant]
name = "Aria"

[professional]
current_role = "Senior Backend Engineer"
company = "Acme"
experience_years = 8
current_routine = "9-5 CET"
job_search_status = "passive"

[[professional.skills]]
name = "Rust"
experience_years = 5

[information]
name = "Dana"
last_name = "Keller"
email = "dana@example.com"
resume_url = "https://example.com/resume.pdf"

[information.location]
city = "Berlin"
country = "Germany"

[preferences]
min_salary = 90000
location = "Berlin or remote"
remote_work = true
"#;

    #[test]
    fn loads_profile_from_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(PROFILE.as_bytes()).expect("write profile");

        let person = PersonContext::load(file.path()).expect("profile should parse");
        assert_eq!(person.assistant.name, "Aria");
        assert_eq!(person.professional.job_search_status, JobSearchStatus::Passive);
        assert_eq!(person.professional.skills.len(), 1);
        assert!(!person.information.location.open_to_relocation);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let error = PersonContext::load(std::path::Path::new("/nonexistent/person.toml"))
            .expect_err("must fail");
        assert!(error.to_string().contains("could not read person profile"));
    }
}
