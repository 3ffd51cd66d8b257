// ABOUTME: Per-object and per-profile outcomes of create and drop runs
// ABOUTME: Failures are kept as rendered messages so a batch can continue

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Publication,
    Slot,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Publication => write!(f, "publication"),
            ObjectKind::Slot => write!(f, "replication slot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// An existing publication gained the listed tables.
    Extended { added: Vec<String> },
    AlreadyExists,
    Dropped,
    /// Nothing to drop.
    Absent,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Extended { added } => write!(f, "added {}", added.join(", ")),
            Outcome::AlreadyExists => write!(f, "already exists"),
            Outcome::Dropped => write!(f, "dropped"),
            Outcome::Absent => write!(f, "does not exist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub kind: ObjectKind,
    pub name: String,
    pub result: Result<Outcome, String>,
}

impl ObjectReport {
    pub fn new(kind: ObjectKind, name: &str, result: anyhow::Result<Outcome>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            result: result.map_err(|e| format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileReport {
    pub profile: String,
    pub action: Action,
    pub objects: Vec<ObjectReport>,
    /// Set when the profile never got as far as its objects, e.g. the
    /// connection could not be opened.
    pub failure: Option<String>,
}

impl ProfileReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.objects.iter().all(|o| o.result.is_ok())
    }

    pub fn object(&self, kind: ObjectKind) -> Option<&ObjectReport> {
        self.objects.iter().find(|o| o.kind == kind)
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action {
            Action::Create => "create",
            Action::Drop => "drop",
        };
        let status = if self.is_success() { "OK" } else { "FAILED" };
        writeln!(f, "[{}] {} {}", status, verb, self.profile)?;

        if let Some(failure) = &self.failure {
            writeln!(f, "  - {}", failure)?;
        }
        for object in &self.objects {
            match &object.result {
                Ok(outcome) => writeln!(f, "  - {} {}: {}", object.kind, object.name, outcome)?,
                Err(e) => writeln!(f, "  - {} {}: error: {}", object.kind, object.name, e)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub profiles: Vec<ProfileReport>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &ProfileReport> {
        self.profiles.iter().filter(|p| !p.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}
