use chrono::{DateTime, Local, SecondsFormat};

/// Contents of the lock file: the owner's pid, then optionally when it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub owner_pid: u32,
    pub acquired_at: Option<DateTime<Local>>,
}

impl LockRecord {
    pub fn for_current_process() -> Self {
        Self {
            owner_pid: std::process::id(),
            acquired_at: Some(Local::now()),
        }
    }

    /// Lenient: only the pid line is required. A timestamp in any other format is
    /// ignored rather than rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let owner_pid = lines.next()?.parse().ok()?;
        let acquired_at = lines
            .next()
            .and_then(|line| DateTime::parse_from_rfc3339(line).ok())
            .map(|t| t.with_timezone(&Local));
        Some(Self {
            owner_pid,
            acquired_at,
        })
    }

    pub fn render(&self) -> String {
        match &self.acquired_at {
            Some(at) => format!(
                "{}\n{}\n",
                self.owner_pid,
                at.to_rfc3339_opts(SecondsFormat::Secs, false)
            ),
            None => format!("{}\n", self.owner_pid),
        }
    }
}
