use crate::models::{Answer, Question, Subject};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A database name bound to a resolved file location, ready to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseBuilder {
    name: String,
    path: PathBuf,
}

impl DatabaseBuilder {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the database, creating its directory and schema on first use.
    pub fn build(&self) -> crate::Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = create_or_open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        debug!("[DB] Database '{}' ready", self.name);
        Ok(conn)
    }
}

/// One recorded attempt at a question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerLog {
    pub id: i64,
    pub q_id: i64,
    pub answer_id: Option<i64>,
    pub correct: bool,
    pub answered_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Subject,
    System,
}

impl Grouping {
    fn table(self) -> &'static str {
        match self {
            Grouping::Subject => "Subject",
            Grouping::System => "System",
        }
    }
    fn column(self) -> &'static str {
        match self {
            Grouping::Subject => "subId",
            Grouping::System => "sysId",
        }
    }
}

fn insert_grouping(connection: &Connection, grouping: Grouping, id: i64, name: &str) -> Result<()> {
    let sql = format!("INSERT INTO {}(id, name) VALUES (?1, ?2)", grouping.table());
    match connection.execute(&sql, params![id, name]) {
        Ok(_) => {
            debug!("[DB] Created new {} {} '{}'", grouping.table(), id, name);
            Ok(())
        }
        Err(err) => {
            error!("[DB] Error while creating new {}: {:?}", grouping.table(), err);
            Err(err)
        }
    }
}

fn delete_grouping(connection: &Connection, grouping: Grouping, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", grouping.table());
    match connection.execute(&sql, params![id]) {
        Ok(_) => {
            debug!("[DB] Deleted {} {}", grouping.table(), id);
            Ok(())
        }
        Err(err) => {
            error!("[DB] Error while deleting {} {}: {:?}", grouping.table(), id, err);
            Err(err)
        }
    }
}

fn grouping_with_counts(connection: &Connection, grouping: Grouping) -> Result<Vec<Subject>> {
    let sql = format!(
        "SELECT g.id, g.name, COUNT(q.id) FROM {table} g \
         LEFT JOIN Question q ON q.{column} = g.id \
         GROUP BY g.id ORDER BY g.name",
        table = grouping.table(),
        column = grouping.column()
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map([], |row| {
        Ok(Subject {
            id: row.get(0)?,
            name: row.get(1)?,
            count: row.get(2)?,
        })
    })?;

    rows.collect()
}

fn grouping_by<P: rusqlite::Params>(
    connection: &Connection,
    grouping: Grouping,
    filter: &str,
    param: P,
) -> Result<Option<Subject>> {
    let sql = format!(
        "SELECT g.id, g.name, (SELECT COUNT(*) FROM Question q WHERE q.{column} = g.id) \
         FROM {table} g WHERE {filter} LIMIT 1",
        table = grouping.table(),
        column = grouping.column(),
    );
    connection
        .query_row(&sql, param, |row| {
            Ok(Subject {
                id: row.get(0)?,
                name: row.get(1)?,
                count: row.get(2)?,
            })
        })
        .optional()
}

impl Subject {
    pub fn add(connection: &Connection, src: &Subject) -> Result<()> {
        insert_grouping(connection, Grouping::Subject, src.id, &src.name)
    }
    pub fn delete(connection: &Connection, id: i64) -> Result<()> {
        delete_grouping(connection, Grouping::Subject, id)
    }

    /// All subjects, by name, with their question counts filled in.
    pub fn get_all(connection: &Connection) -> Result<Vec<Subject>> {
        grouping_with_counts(connection, Grouping::Subject)
    }
    pub fn get_by_id(connection: &Connection, id: i64) -> Result<Option<Subject>> {
        grouping_by(connection, Grouping::Subject, "g.id = ?1", params![id])
    }
    pub fn get_by_name(connection: &Connection, name: &str) -> Result<Option<Subject>> {
        grouping_by(connection, Grouping::Subject, "g.name = ?1", params![name])
    }

    pub fn add_system(connection: &Connection, src: &Subject) -> Result<()> {
        insert_grouping(connection, Grouping::System, src.id, &src.name)
    }
    pub fn delete_system(connection: &Connection, id: i64) -> Result<()> {
        delete_grouping(connection, Grouping::System, id)
    }
    pub fn get_all_systems(connection: &Connection) -> Result<Vec<Subject>> {
        grouping_with_counts(connection, Grouping::System)
    }
    pub fn get_system_by_id(connection: &Connection, id: i64) -> Result<Option<Subject>> {
        grouping_by(connection, Grouping::System, "g.id = ?1", params![id])
    }
    pub fn get_system_by_name(connection: &Connection, name: &str) -> Result<Option<Subject>> {
        grouping_by(connection, Grouping::System, "g.name = ?1", params![name])
    }
}

const QUESTION_SELECT: &str = "SELECT q.id, q.question, q.explanation, q.corrAns, q.title, q.image, \
     q.images, q.peopleTaken, q.corrTaken, q.subId, q.sysId, s.name, y.name \
     FROM Question q \
     LEFT JOIN Subject s ON s.id = q.subId \
     LEFT JOIN System y ON y.id = q.sysId";

impl Question {
    pub fn add(connection: &Connection, src: &Question) -> Result<()> {
        match connection.execute(
            "INSERT INTO \
            Question(id, question, explanation, corrAns, title, image, images, peopleTaken, \
                     corrTaken, subId, sysId) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                src.id,
                src.question,
                src.explanation,
                src.corr_ans,
                src.title,
                src.image,
                src.images,
                src.people_taken,
                src.corr_taken,
                src.subject_id,
                src.system_id
            ],
        ) {
            Ok(_) => {
                debug!("[DB] Created new Question {} in Subject {:?}", src.id, src.subject_id);
                Ok(())
            }
            Err(err) => {
                error!("[DB] Error while creating new Question {}: {:?}", src.id, err);
                Err(err)
            }
        }
    }

    pub fn delete(connection: &Connection, id: i64) -> Result<()> {
        match connection.execute("DELETE FROM Question WHERE id = ?1", params![id]) {
            Ok(_) => {
                debug!("[DB] Deleted Question {}", id);
                Ok(())
            }
            Err(err) => {
                error!("[DB] Error while deleting Question {}: {:?}", id, err);
                Err(err)
            }
        }
    }

    fn from_row(row: &Row) -> Result<Question> {
        Ok(Question {
            id: row.get(0)?,
            question: row.get(1)?,
            explanation: row.get(2)?,
            corr_ans: row.get(3)?,
            title: row.get(4)?,
            image: row.get(5)?,
            images: row.get(6)?,
            people_taken: row.get(7)?,
            corr_taken: row.get(8)?,
            subject_id: row.get(9)?,
            system_id: row.get(10)?,
            subject_name: row.get(11)?,
            system_name: row.get(12)?,
        })
    }

    pub fn get_all(connection: &Connection) -> Result<Vec<Question>> {
        let mut statement = connection.prepare(&format!("{QUESTION_SELECT} ORDER BY q.id"))?;
        let rows = statement.query_map([], Self::from_row)?;

        rows.collect()
    }

    pub fn get_by_id(connection: &Connection, id: i64) -> Result<Option<Question>> {
        let mut statement = connection.prepare(&format!("{QUESTION_SELECT} WHERE q.id = ?1"))?;
        statement.query_row(params![id], Self::from_row).optional()
    }

    pub fn get_in_subject(connection: &Connection, subject_id: i64) -> Result<Vec<Question>> {
        let mut statement =
            connection.prepare(&format!("{QUESTION_SELECT} WHERE q.subId = ?1 ORDER BY q.id"))?;
        let rows = statement.query_map(params![subject_id], Self::from_row)?;

        rows.collect()
    }

    pub fn get_in_system(connection: &Connection, system_id: i64) -> Result<Vec<Question>> {
        let mut statement =
            connection.prepare(&format!("{QUESTION_SELECT} WHERE q.sysId = ?1 ORDER BY q.id"))?;
        let rows = statement.query_map(params![system_id], Self::from_row)?;

        rows.collect()
    }

    /// Id of a question with exactly this text in the same subject (or in no subject).
    pub fn find_by_text(connection: &Connection, question: &str, subject_id: Option<i64>) -> Result<Option<i64>> {
        connection
            .query_row(
                "SELECT id FROM Question WHERE question = ?1 AND subId IS ?2 ORDER BY id LIMIT 1",
                params![question, subject_id],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn count(connection: &Connection) -> Result<i64> {
        connection.query_row("SELECT COUNT(*) FROM Question", [], |row| row.get(0))
    }

    fn latest_id(connection: &Connection) -> Result<Option<i64>> {
        connection.query_row("SELECT MAX(id) FROM Question", [], |row| row.get(0))
    }

    pub fn next_id(connection: &Connection) -> Result<i64> {
        Ok(Self::latest_id(connection)?.unwrap_or(0) + 1)
    }
}

impl Answer {
    /// Inserts the answer and returns its new id. `src.id` is ignored.
    pub fn add(connection: &Connection, src: &Answer) -> Result<i64> {
        match connection.execute(
            "INSERT INTO Answer(answerText, correctPercentage, qId) VALUES (?1, ?2, ?3)",
            params![src.answer_text, src.correct_percentage, src.q_id],
        ) {
            Ok(_) => {
                let id = connection.last_insert_rowid();
                debug!("[DB] Created new Answer {} for Question {}", id, src.q_id);
                Ok(id)
            }
            Err(err) => {
                error!("[DB] Error while creating Answer for Question {}: {:?}", src.q_id, err);
                Err(err)
            }
        }
    }

    pub fn delete(connection: &Connection, id: i64) -> Result<()> {
        match connection.execute("DELETE FROM Answer WHERE id = ?1", params![id]) {
            Ok(_) => {
                debug!("[DB] Deleted Answer {}", id);
                Ok(())
            }
            Err(err) => {
                error!("[DB] Error while deleting Answer {}: {:?}", id, err);
                Err(err)
            }
        }
    }

    /// Answers of a question, ordered by id. `Question::corr_ans` indexes into this list.
    pub fn get_for_question(connection: &Connection, q_id: i64) -> Result<Vec<Answer>> {
        let mut statement = connection.prepare(
            "SELECT id, answerText, correctPercentage, qId FROM Answer WHERE qId = ?1 ORDER BY id",
        )?;
        let rows = statement.query_map(params![q_id], |row| {
            Ok(Answer {
                id: row.get(0)?,
                answer_text: row.get(1)?,
                correct_percentage: row.get(2)?,
                q_id: row.get(3)?,
            })
        })?;

        rows.collect()
    }
}

impl AnswerLog {
    pub fn record(connection: &Connection, q_id: i64, answer_id: Option<i64>, correct: bool) -> Result<i64> {
        match connection.execute(
            "INSERT INTO AnswerLog(qId, answerId, correct) VALUES (?1, ?2, ?3)",
            params![q_id, answer_id, correct],
        ) {
            Ok(_) => {
                debug!("[DB] Logged answer {:?} for Question {} (correct: {})", answer_id, q_id, correct);
                Ok(connection.last_insert_rowid())
            }
            Err(err) => {
                error!("[DB] Failed to log answer for Question {}: {:?}", q_id, err);
                Err(err)
            }
        }
    }

    pub fn get_for_question(connection: &Connection, q_id: i64) -> Result<Vec<AnswerLog>> {
        let mut statement = connection.prepare(
            "SELECT id, qId, answerId, correct, answeredAt FROM AnswerLog WHERE qId = ?1 ORDER BY id",
        )?;
        let rows = statement.query_map(params![q_id], |row| {
            Ok(AnswerLog {
                id: row.get(0)?,
                q_id: row.get(1)?,
                answer_id: row.get(2)?,
                correct: row.get(3)?,
                answered_at: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(connection: &Connection) -> Result<i64> {
        connection.query_row("SELECT COUNT(*) FROM AnswerLog", [], |row| row.get(0))
    }

    pub fn count_correct(connection: &Connection) -> Result<i64> {
        connection.query_row("SELECT COUNT(*) FROM AnswerLog WHERE correct = 1", [], |row| row.get(0))
    }
}

pub fn create_or_open(src: &Path) -> Result<Connection> {
    if src.exists() {
        info!("[DB] Opening existing Database");
        open_db(src)
    } else {
        info!("[DB] Creating new Database");
        create_db(src)
    }
}

/// Builds the schema in memory, then saves it to `dest` and reopens it from there.
pub fn create_db(dest: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = Connection::open_in_memory()?;
    init_db(&db)?;
    match db.backup(DatabaseName::Main, dest, None) {
        Ok(_) => {
            close_db(db)?;
            debug!(
                "[DB] Creating and Saving took {} ms.",
                now.elapsed().as_millis()
            );
            open_db(dest)
        }
        Err(err) => {
            warn!("[DB] Failed to create database file: {}", err);
            close_db(db)?;
            Err(err)
        }
    }
}

pub fn open_db(src: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = Connection::open(src)?;
    debug!("[DB] Opening took {} ms.", now.elapsed().as_millis());
    Ok(db)
}

/// In-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let db = Connection::open_in_memory()?;
    init_db(&db)?;
    db.pragma_update(None, "foreign_keys", true)?;
    Ok(db)
}

pub fn close_db(connection: Connection) -> Result<()> {
    info!("[DB] Closing Database");
    let mut connection = connection;
    for attempt in 1..=3 {
        match connection.close() {
            Ok(_) => return Ok(()),
            Err((conn, err)) => {
                if attempt == 3 {
                    error!("[DB] Cannot close connection! Giving up.");
                    return Err(err);
                }
                error!("[DB] Cannot close connection. Retrying {}/2...", attempt);
                connection = conn;
            }
        }
    }
    Ok(())
}

fn init_db(conn: &Connection) -> Result<()> {
    info!("[DB INIT] Creating tables");
    conn.execute(
        "CREATE TABLE Subject (
              id INTEGER NOT NULL PRIMARY KEY,
              name TEXT NOT NULL
            )",
        (),
    )?;
    info!("[DB INIT] Created table Subject");
    conn.execute(
        "CREATE TABLE System (
              id INTEGER NOT NULL PRIMARY KEY,
              name TEXT NOT NULL
            )",
        (),
    )?;
    info!("[DB INIT] Created table System");
    conn.execute(
        "CREATE TABLE Question (
              id INTEGER NOT NULL PRIMARY KEY,
              question TEXT NOT NULL,
              explanation TEXT NOT NULL,
              corrAns INTEGER NOT NULL,
              title TEXT,
              image TEXT,
              images TEXT,
              peopleTaken REAL,
              corrTaken REAL,
              subId INTEGER,
              sysId INTEGER,
              FOREIGN KEY (subId) REFERENCES Subject(id) ON DELETE SET NULL ON UPDATE CASCADE,
              FOREIGN KEY (sysId) REFERENCES System(id) ON DELETE SET NULL ON UPDATE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Question");
    conn.execute(
        "CREATE TABLE Answer (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              answerText TEXT NOT NULL,
              correctPercentage REAL,
              qId INTEGER NOT NULL,
              FOREIGN KEY (qId) REFERENCES Question(id) ON DELETE CASCADE ON UPDATE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Answer");
    conn.execute(
        "CREATE TABLE AnswerLog (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              qId INTEGER NOT NULL,
              answerId INTEGER,
              correct INTEGER NOT NULL,
              answeredAt TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
              FOREIGN KEY (qId) REFERENCES Question(id) ON DELETE CASCADE ON UPDATE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table AnswerLog");
    conn.execute("CREATE INDEX Question_subId_idx ON Question(subId)", ())?;
    conn.execute("CREATE INDEX Question_sysId_idx ON Question(sysId)", ())?;
    conn.execute("CREATE INDEX Answer_qId_idx ON Answer(qId)", ())?;
    conn.execute("CREATE INDEX AnswerLog_qId_idx ON AnswerLog(qId)", ())?;
    info!("[DB INIT] Created indexes");
    info!("[DB INIT] Database Creation Successful!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::desktop_database_builder;
    use tempfile::tempdir;

    fn seed(conn: &Connection) {
        Subject::add(conn, &Subject::new(1, "Pharmacology")).unwrap();
        Subject::add(conn, &Subject::new(2, "Anatomy")).unwrap();
        Subject::add_system(conn, &Subject::new(10, "Cardiovascular")).unwrap();

        let mut q = Question::new(100, "First-line drug for stable angina?", "Beta blockers.", 1);
        q.subject_id = Some(1);
        q.system_id = Some(10);
        q.people_taken = Some(120.0);
        q.corr_taken = Some(80.0);
        Question::add(conn, &q).unwrap();

        for text in ["Nitrates", "Beta blockers", "Aspirin"] {
            Answer::add(conn, &Answer::new(0, text, 100)).unwrap();
        }
    }

    #[test]
    fn test_builder_creates_schema_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("quiz.db");
        let builder = desktop_database_builder(path.to_str().unwrap());

        let conn = builder.build().unwrap();
        seed(&conn);
        close_db(conn).unwrap();
        assert!(path.exists());

        let conn = builder.build().unwrap();
        assert_eq!(Question::count(&conn).unwrap(), 1);
        close_db(conn).unwrap();
    }

    #[test]
    fn test_question_join_fills_names() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let q = Question::get_by_id(&conn, 100).unwrap().unwrap();
        assert_eq!(q.subject_name.as_deref(), Some("Pharmacology"));
        assert_eq!(q.system_name.as_deref(), Some("Cardiovascular"));
        assert_eq!(q.corr_ans, 1);
        assert!(q.title.is_none());
        assert!(Question::get_by_id(&conn, 999).unwrap().is_none());

        assert_eq!(Question::get_in_system(&conn, 10).unwrap().len(), 1);
        assert_eq!(Question::next_id(&conn).unwrap(), 101);
    }

    #[test]
    fn test_subjects_with_counts() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let subjects = Subject::get_all(&conn).unwrap();
        let names: Vec<_> = subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Anatomy", "Pharmacology"]);
        assert_eq!(subjects[0].count, Some(0));
        assert_eq!(subjects[1].count, Some(1));

        let by_name = Subject::get_by_name(&conn, "Pharmacology").unwrap().unwrap();
        assert_eq!(by_name.id, 1);
        assert_eq!(by_name.count, Some(1));
        assert!(Subject::get_by_id(&conn, 42).unwrap().is_none());

        let systems = Subject::get_all_systems(&conn).unwrap();
        assert_eq!(systems, vec![Subject { id: 10, name: "Cardiovascular".into(), count: Some(1) }]);
    }

    #[test]
    fn test_system_lookup_by_name() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let system = Subject::get_system_by_name(&conn, "Cardiovascular").unwrap().unwrap();
        assert_eq!(system.id, 10);
        assert_eq!(system.count, Some(1));
        assert!(Subject::get_system_by_name(&conn, "Pharmacology").unwrap().is_none());
        assert!(Subject::get_by_name(&conn, "Cardiovascular").unwrap().is_none());
    }

    #[test]
    fn test_find_question_by_text() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        Question::add(&conn, &Question::new(101, "Loose question", "", 0)).unwrap();

        let text = "First-line drug for stable angina?";
        assert_eq!(Question::find_by_text(&conn, text, Some(1)).unwrap(), Some(100));
        assert_eq!(Question::find_by_text(&conn, text, Some(2)).unwrap(), None);
        assert_eq!(Question::find_by_text(&conn, text, None).unwrap(), None);
        assert_eq!(Question::find_by_text(&conn, "Loose question", None).unwrap(), Some(101));
    }

    #[test]
    fn test_answers_ordered_and_cascade() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let answers = Answer::get_for_question(&conn, 100).unwrap();
        let texts: Vec<_> = answers.iter().map(|a| a.answer_text.as_str()).collect();
        assert_eq!(texts, vec!["Nitrates", "Beta blockers", "Aspirin"]);
        assert!(answers.iter().all(|a| a.q_id == 100));

        AnswerLog::record(&conn, 100, Some(answers[1].id), true).unwrap();
        Question::delete(&conn, 100).unwrap();
        assert!(Answer::get_for_question(&conn, 100).unwrap().is_empty());
        assert_eq!(AnswerLog::count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_answer_requires_existing_question() {
        let conn = open_in_memory().unwrap();
        assert!(Answer::add(&conn, &Answer::new(0, "Orphan", 5)).is_err());
    }

    #[test]
    fn test_deleting_subject_keeps_questions() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        Subject::delete(&conn, 1).unwrap();
        let q = Question::get_by_id(&conn, 100).unwrap().unwrap();
        assert_eq!(q.subject_id, None);
        assert_eq!(q.subject_name, None);
    }

    #[test]
    fn test_answer_log_counts() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        AnswerLog::record(&conn, 100, Some(1), false).unwrap();
        AnswerLog::record(&conn, 100, Some(2), true).unwrap();
        AnswerLog::record(&conn, 100, None, false).unwrap();

        assert_eq!(AnswerLog::count(&conn).unwrap(), 3);
        assert_eq!(AnswerLog::count_correct(&conn).unwrap(), 1);
        let logs = AnswerLog::get_for_question(&conn, 100).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[2].answer_id, None);
        assert!(!logs[0].answered_at.is_empty());
    }
}
