/// Backend routes used by the exam-taking session.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through untouched; paths are joined onto the base.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.base_url, path)
    }

    pub fn exam_detail(exam_id: &str) -> String {
        format!("/api/v1/exams/{exam_id}/")
    }

    pub fn exam_attempt(exam_id: &str) -> String {
        format!("/api/v1/exams/{exam_id}/attempt/")
    }

    pub fn exam_save(exam_id: &str) -> String {
        format!("/api/v1/exams/{exam_id}/attempt/save/")
    }

    pub fn exam_submit(exam_id: &str) -> String {
        format!("/api/v1/exams/{exam_id}/attempt/submit/")
    }

    pub fn token_refresh() -> &'static str {
        "/api/v1/auth/refresh/"
    }
}

/// Ids are spliced into paths and the results query unescaped, so only ASCII letters,
/// digits, `-`, `_` and `.` are accepted.
pub fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'))
}

/// Location of the results view shown after a successful final submission.
pub fn results_redirect(route: &str, exam_id: &str, attempt_id: &str) -> String {
    format!("{route}?exam_id={exam_id}&attempt_id={attempt_id}")
}
