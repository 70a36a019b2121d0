use chrono::{Local, TimeZone};

/// Current time as epoch seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Formats epoch seconds as a local "%Y-%m-%d %H:%M:%S" string.
pub fn fmttime(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => ts.to_string(),
    }
}

/// Last path segment of a full task name
/// ("/wf/Task1/SubTask" -> "SubTask").
pub fn task_basename(full_task_name: &str) -> &str {
    full_task_name.rsplit('/').next().unwrap_or(full_task_name)
}

/// The input task is the second-to-last path segment, present only for
/// nested task paths (more than three segments including the leading empty
/// one).
pub fn input_task(full_task_name: &str) -> Option<String> {
    let segments: Vec<&str> = full_task_name.split('/').collect();
    if segments.len() > 3 {
        segments.get(segments.len() - 2).map(|s| s.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_basename_takes_last_segment() {
        assert_eq!(task_basename("/wf_x/Production/StepOne"), "StepOne");
        assert_eq!(task_basename("bare"), "bare");
    }

    #[test]
    fn input_task_requires_nested_path() {
        assert_eq!(
            input_task("/wf_x/Production/StepOne"),
            Some("Production".to_string())
        );
        assert_eq!(input_task("/wf_x/Production"), None);
        assert_eq!(input_task("bare"), None);
    }
}
