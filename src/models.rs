use serde::{Deserialize, Serialize};

/// A question row, with the subject and system names of its joins inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question: String,
    pub explanation: String,
    /// Zero-based position of the correct answer among the question's answers, ordered by id.
    pub corr_ans: i64,
    pub title: Option<String>,
    pub image: Option<String>,
    /// Additional media filenames, stored as a JSON array string.
    pub images: Option<String>,
    pub people_taken: Option<f64>,
    pub corr_taken: Option<f64>,
    pub subject_id: Option<i64>,
    pub system_id: Option<i64>,
    pub subject_name: Option<String>,
    pub system_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub answer_text: String,
    pub correct_percentage: Option<f64>,
    pub q_id: i64,
}

/// A subject with an optional question count. Systems are read into this shape too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub count: Option<i64>,
}

impl Question {
    pub fn new(id: i64, question: impl Into<String>, explanation: impl Into<String>, corr_ans: i64) -> Self {
        Self {
            id,
            question: question.into(),
            explanation: explanation.into(),
            corr_ans,
            title: None,
            image: None,
            images: None,
            people_taken: None,
            corr_taken: None,
            subject_id: None,
            system_id: None,
            subject_name: None,
            system_name: None,
        }
    }

    /// Parses `images`. Accepts a JSON array and falls back to a comma separated list.
    pub fn additional_images(&self) -> Vec<String> {
        let Some(raw) = self.images.as_deref() else {
            return Vec::new();
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => list.into_iter().filter(|s| !s.is_empty()).collect(),
            Err(_) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Share of takers who answered correctly, in `0.0..=1.0`.
    pub fn success_rate(&self) -> Option<f64> {
        match (self.people_taken, self.corr_taken) {
            (Some(people), Some(correct)) if people > 0.0 => Some((correct / people).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

impl Answer {
    pub fn new(id: i64, answer_text: impl Into<String>, q_id: i64) -> Self {
        Self {
            id,
            answer_text: answer_text.into(),
            correct_percentage: None,
            q_id,
        }
    }
}

impl Subject {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_without_optionals() {
        let q = Question::new(7, "Which nerve?", "Because.", 2);

        assert_eq!(q.corr_ans, 2);
        assert!(q.title.is_none());
        assert!(q.image.is_none());
        assert!(q.images.is_none());
        assert!(q.people_taken.is_none());
        assert!(q.corr_taken.is_none());
        assert!(q.subject_id.is_none());
        assert!(q.system_id.is_none());
        assert!(q.subject_name.is_none());
        assert!(q.system_name.is_none());
        assert!(q.additional_images().is_empty());
        assert_eq!(q.success_rate(), None);
    }

    #[test]
    fn test_structural_equality() {
        let a = Answer::new(1, "Vagus", 7);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.correct_percentage = Some(41.5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_additional_images_json_and_legacy() {
        let mut q = Question::new(1, "q", "e", 0);
        q.images = Some(r#"["a.png", "b.svg"]"#.to_string());
        assert_eq!(q.additional_images(), vec!["a.png", "b.svg"]);

        q.images = Some("c.png, d.jpg,".to_string());
        assert_eq!(q.additional_images(), vec!["c.png", "d.jpg"]);
    }

    #[test]
    fn test_success_rate() {
        let mut q = Question::new(1, "q", "e", 0);
        q.people_taken = Some(200.0);
        q.corr_taken = Some(50.0);
        assert_eq!(q.success_rate(), Some(0.25));

        q.people_taken = Some(0.0);
        assert_eq!(q.success_rate(), None);
    }
}
