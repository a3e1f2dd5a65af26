use crate::db::AnswerLog;
use crate::models::{Answer, Question, Subject};
use log::{debug, warn};
use rand::rng;
use rand::seq::{IndexedRandom, SliceRandom};
use rusqlite::{Connection, Result};
use std::time::Instant;

macro_rules! extract_or_continue {
    ($field:expr, $warn_msg:expr $(, $args:expr)*) => {
        match $field {
            None => {
                warn!($warn_msg $(, $args)*);
                continue;
            }
            Some(value) => value,
        }
    };
}

/// A question together with its answers, ready to be asked.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizItem {
    pub question: Question,
    pub answers: Vec<Answer>,
}

impl QuizItem {
    /// Position of the correct answer, if `corr_ans` points at a loaded answer.
    pub fn correct_index(&self) -> Option<usize> {
        usize::try_from(self.question.corr_ans)
            .ok()
            .filter(|idx| *idx < self.answers.len())
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.correct_index().map(|idx| &self.answers[idx])
    }

    pub fn is_correct(&self, choice: usize) -> bool {
        self.correct_index() == Some(choice)
    }

    /// Main image first, then the additional ones.
    pub fn media(&self) -> Vec<String> {
        let mut media: Vec<String> = self.question.image.iter().cloned().collect();
        media.extend(self.question.additional_images());
        media
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect { correct: usize },
    Skipped { correct: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub correct: u32,
    pub answered: u32,
}

#[derive(Debug)]
pub struct QuizSession {
    items: Vec<QuizItem>,
    current: usize,
    score: Score,
}

impl QuizSession {
    pub fn new(items: Vec<QuizItem>) -> Self {
        Self {
            items,
            current: 0,
            score: Score::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QuizItem] {
        &self.items
    }

    pub fn position(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&QuizItem> {
        self.items.get(self.current)
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.items.len()
    }

    pub fn score(&self) -> Score {
        self.score
    }

    /// Grades the current question and moves on. `None` skips ("don't know").
    /// Attempts are written to the answer log only when `log_answers` is set.
    pub fn submit(&mut self, conn: &Connection, log_answers: bool, choice: Option<usize>) -> Result<Option<Outcome>> {
        let Some(item) = self.items.get(self.current) else {
            return Ok(None);
        };
        let Some(correct) = item.correct_index() else {
            warn!("[Quiz] Question {} has no valid correct answer", item.question.id);
            self.current += 1;
            return Ok(None);
        };

        let outcome = match choice {
            Some(choice) if choice == correct => Outcome::Correct,
            Some(_) => Outcome::Incorrect { correct },
            None => Outcome::Skipped { correct },
        };
        if log_answers {
            let answer_id = choice.and_then(|c| item.answers.get(c)).map(|a| a.id);
            AnswerLog::record(conn, item.question.id, answer_id, outcome == Outcome::Correct)?;
        }

        self.score.answered += 1;
        if outcome == Outcome::Correct {
            self.score.correct += 1;
        }
        debug!("[Quiz] Question {} -> {:?}", item.question.id, outcome);
        self.current += 1;
        Ok(Some(outcome))
    }
}

/// The named subject, or a random one with at least one question.
pub fn pick_subject(conn: &Connection, name: Option<&str>) -> Result<Option<Subject>> {
    if let Some(name) = name {
        return Subject::get_by_name(conn, name);
    }
    let subjects: Vec<Subject> = Subject::get_all(conn)?
        .into_iter()
        .filter(|s| s.count.unwrap_or(0) > 0)
        .collect();
    Ok(subjects.choose(&mut rng()).cloned())
}

/// Up to `count` random questions, from one subject or from the whole bank.
pub fn pick_questions(conn: &Connection, subject: Option<&Subject>, count: usize) -> Result<Vec<Question>> {
    debug!("[Setup] Obtaining {} questions.", count);
    let mut questions = match subject {
        Some(subject) => Question::get_in_subject(conn, subject.id)?,
        None => Question::get_all(conn)?,
    };
    questions.shuffle(&mut rng());
    questions.truncate(count);
    Ok(questions)
}

/// Loads the answers of every question, skipping those whose `corr_ans`
/// does not index one of them.
pub fn init_quiz(conn: &Connection, questions: Vec<Question>) -> Result<Vec<QuizItem>> {
    let now = Instant::now();
    let mut items = Vec::with_capacity(questions.len());
    for question in questions {
        let answers = Answer::get_for_question(conn, question.id)?;
        let item = QuizItem { question, answers };
        extract_or_continue!(
            item.correct_index(),
            "[Setup] Question {} has corrAns {} but {} answers! Skipping...",
            item.question.id,
            item.question.corr_ans,
            item.answers.len()
        );
        items.push(item);
    }

    debug!(
        "[Setup] Initialized {} questions in {} ms.",
        items.len(),
        now.elapsed().as_millis()
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed(conn: &Connection) {
        Subject::add(conn, &Subject::new(1, "Physiology")).unwrap();
        Subject::add(conn, &Subject::new(2, "Empty")).unwrap();
        for id in 1..=5 {
            let mut q = Question::new(id, format!("Question {id}"), "Explanation", 2);
            q.subject_id = Some(1);
            Question::add(conn, &q).unwrap();
            for n in 0..4 {
                Answer::add(conn, &Answer::new(0, format!("Q{id} answer {n}"), id)).unwrap();
            }
        }
        // corrAns past the end of its answers
        let mut broken = Question::new(6, "Broken", "None", 7);
        broken.subject_id = Some(1);
        Question::add(conn, &broken).unwrap();
        Answer::add(conn, &Answer::new(0, "Only answer", 6)).unwrap();
    }

    fn item(corr_ans: i64, answers: usize) -> QuizItem {
        QuizItem {
            question: Question::new(1, "q", "e", corr_ans),
            answers: (0..answers as i64).map(|i| Answer::new(i + 1, format!("a{i}"), 1)).collect(),
        }
    }

    #[test]
    fn test_correct_index_is_validated() {
        assert_eq!(item(2, 4).correct_index(), Some(2));
        assert_eq!(item(4, 4).correct_index(), None);
        assert_eq!(item(-1, 4).correct_index(), None);
        assert!(item(0, 1).is_correct(0));
        assert_eq!(item(1, 3).correct_answer().map(|a| a.id), Some(2));
    }

    #[test]
    fn test_media_lists_main_image_first() {
        let mut item = item(0, 1);
        item.question.image = Some("main.png".into());
        item.question.images = Some(r#"["extra.svg"]"#.into());
        assert_eq!(item.media(), vec!["main.png", "extra.svg"]);
    }

    #[test]
    fn test_init_quiz_skips_invalid_questions() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let subject = pick_subject(&conn, Some("Physiology")).unwrap().unwrap();
        let questions = pick_questions(&conn, Some(&subject), 100).unwrap();
        assert_eq!(questions.len(), 6);

        let items = init_quiz(&conn, questions).unwrap();
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|i| i.answers.len() == 4));
    }

    #[test]
    fn test_pick_respects_count_and_skips_empty_subjects() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        assert_eq!(pick_questions(&conn, None, 3).unwrap().len(), 3);
        for _ in 0..10 {
            let subject = pick_subject(&conn, None).unwrap().unwrap();
            assert_eq!(subject.name, "Physiology");
        }
        assert!(pick_subject(&conn, Some("Nope")).unwrap().is_none());
    }

    #[test]
    fn test_session_scores_and_logs() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        let questions = (1..=3).map(|id| Question::get_by_id(&conn, id).unwrap().unwrap()).collect();
        let mut session = QuizSession::new(init_quiz(&conn, questions).unwrap());
        assert_eq!(session.len(), 3);

        assert_eq!(session.submit(&conn, true, Some(2)).unwrap(), Some(Outcome::Correct));
        assert_eq!(
            session.submit(&conn, true, Some(0)).unwrap(),
            Some(Outcome::Incorrect { correct: 2 })
        );
        assert_eq!(
            session.submit(&conn, true, None).unwrap(),
            Some(Outcome::Skipped { correct: 2 })
        );
        assert!(session.is_finished());
        assert_eq!(session.submit(&conn, true, Some(1)).unwrap(), None);
        assert_eq!(session.score(), Score { correct: 1, answered: 3 });

        assert_eq!(AnswerLog::count(&conn).unwrap(), 3);
        assert_eq!(AnswerLog::count_correct(&conn).unwrap(), 1);
        let skipped = AnswerLog::get_for_question(&conn, 3).unwrap();
        assert_eq!(skipped[0].answer_id, None);
    }

    #[test]
    fn test_session_without_logging() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        let questions = vec![Question::get_by_id(&conn, 1).unwrap().unwrap()];
        let mut session = QuizSession::new(init_quiz(&conn, questions).unwrap());

        session.submit(&conn, false, Some(2)).unwrap();
        assert_eq!(session.score().correct, 1);
        assert_eq!(AnswerLog::count(&conn).unwrap(), 0);
    }
}
