use colored::Colorize;
use env_logger::Env;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use medquiz::db::{self, DatabaseBuilder};
use medquiz::models::{Answer, Question, Subject};
use medquiz::platform::desktop_database_builder;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "Medical Quiz bank import/export")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info")]
    log_level: String,
    #[arg(short, long, value_name = "FILE", default_value = "quiz.db")]
    db: String,

    json: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Import,
    Export,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct BankJson {
    #[serde(default)]
    subjects: Vec<GroupJson>,
    #[serde(default)]
    systems: Vec<GroupJson>,
    #[serde(default)]
    questions: Vec<QuestionJson>,
}
#[derive(Serialize, Deserialize, Debug, Clone)]
struct GroupJson {
    id: i64,
    name: String,
}
#[derive(Serialize, Deserialize, Debug, Clone)]
struct QuestionJson {
    id: Option<i64>,
    question: String,
    explanation: String,
    corr_ans: i64,
    title: Option<String>,
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    people_taken: Option<f64>,
    corr_taken: Option<f64>,
    subject_id: Option<i64>,
    system_id: Option<i64>,
    answers: Vec<AnswerJson>,
}
#[derive(Serialize, Deserialize, Debug, Clone)]
struct AnswerJson {
    answer: String,
    correct_percentage: Option<f64>,
}

#[derive(Debug, Default, PartialEq)]
struct ImportSummary {
    questions: usize,
    skipped: usize,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    let json_file = match args.json {
        Some(f) => f,
        None => {
            error!("{}", "JSON file not specified!".red());
            std::process::exit(1);
        }
    };
    let builder: DatabaseBuilder = desktop_database_builder(&args.db);
    info!(
        "{}",
        format!("File at {:?} and Database at {:?}", json_file, builder.path()).cyan()
    );
    let mut db = match builder.build() {
        Ok(d) => d,
        Err(e) => {
            error!("{}{}", "Unable to open Database: ".red(), e);
            std::process::exit(1);
        }
    };

    let status = match args.command {
        Commands::Import => import_file(&mut db, &json_file),
        Commands::Export => export_file(&db, &json_file),
    };

    if let Err(err) = db::close_db(db) {
        error!("{}", format!("Cannot close database: {err}").red());
    }
    if let Err(err) = status {
        error!("{}", err.red());
        std::process::exit(1);
    }
}

fn import_file(db: &mut Connection, json_file: &Path) -> Result<(), String> {
    let json = std::fs::read_to_string(json_file).map_err(|e| format!("Cannot read {json_file:?}: {e}"))?;
    let content: BankJson =
        serde_json::from_str(json.as_str()).map_err(|e| format!("Malformed JSON: {e}!"))?;
    let summary = import_bank(db, &content).map_err(|e| format!("Import failed: {e}"))?;
    info!(
        "{}",
        format!(
            "Imported {} questions ({} skipped)",
            summary.questions, summary.skipped
        )
        .green()
    );
    Ok(())
}

fn export_file(db: &Connection, json_file: &Path) -> Result<(), String> {
    let bank = export_bank(db).map_err(|e| format!("Export failed: {e}"))?;
    let json = serde_json::to_string_pretty(&bank).map_err(|e| format!("Cannot serialize: {e}"))?;
    std::fs::write(json_file, json).map_err(|e| format!("Cannot write {json_file:?}: {e}"))?;
    info!(
        "{}",
        format!("Exported {} questions to {:?}", bank.questions.len(), json_file).green()
    );
    Ok(())
}

fn validate_question(question: &QuestionJson) -> bool {
    !question.question.trim().is_empty()
        && !question.answers.is_empty()
        && usize::try_from(question.corr_ans).is_ok_and(|idx| idx < question.answers.len())
}

/// The subject or system a question points at but the database lacks.
fn missing_reference(db: &Connection, question: &QuestionJson) -> rusqlite::Result<Option<String>> {
    if let Some(id) = question.subject_id {
        if Subject::get_by_id(db, id)?.is_none() {
            return Ok(Some(format!("Subject {id}")));
        }
    }
    if let Some(id) = question.system_id {
        if Subject::get_system_by_id(db, id)?.is_none() {
            return Ok(Some(format!("System {id}")));
        }
    }
    Ok(None)
}

fn import_bank(db: &mut Connection, content: &BankJson) -> rusqlite::Result<ImportSummary> {
    info!(
        "{}",
        format!(
            "Importing data... ({} Subjects, {} Systems, {} Questions)",
            content.subjects.len(),
            content.systems.len(),
            content.questions.len()
        )
        .blue()
    );
    let tx = db.transaction()?;
    let mut summary = ImportSummary::default();

    for subject in &content.subjects {
        if Subject::get_by_id(&tx, subject.id)?.is_none() {
            Subject::add(&tx, &Subject::new(subject.id, subject.name.clone()))?;
        }
        info!("{}", format!("├ Subject: {} ({})", subject.name, subject.id).blue());
    }
    for system in &content.systems {
        if Subject::get_system_by_id(&tx, system.id)?.is_none() {
            Subject::add_system(&tx, &Subject::new(system.id, system.name.clone()))?;
        }
        info!("{}", format!("├ System: {} ({})", system.name, system.id).blue());
    }

    for question in &content.questions {
        if !validate_question(question) {
            error!(
                "{} {}",
                "│".blue(),
                format!(
                    "├ ✘ Question: {:?} (Missing text or answers, or `corr_ans` out of range)",
                    question.id
                )
                .red()
                .strikethrough()
            );
            summary.skipped += 1;
            continue;
        }
        if let Some(reference) = missing_reference(&tx, question)? {
            error!(
                "{} {}",
                "│".blue(),
                format!("├ ✘ Question: {:?} ({reference} does not exist)", question.id)
                    .red()
                    .strikethrough()
            );
            summary.skipped += 1;
            continue;
        }
        let existing = match question.id {
            Some(id) => Question::get_by_id(&tx, id)?.map(|q| q.id),
            None => Question::find_by_text(&tx, &question.question, question.subject_id)?,
        };
        if let Some(existing) = existing {
            warn!("{} {}", "│".blue(), format!("├ Question {existing} already exists, skipping").yellow());
            summary.skipped += 1;
            continue;
        }
        let id = match question.id {
            Some(id) => id,
            None => Question::next_id(&tx)?,
        };

        let images = if question.images.is_empty() {
            None
        } else {
            serde_json::to_string(&question.images).ok()
        };
        Question::add(
            &tx,
            &Question {
                id,
                question: question.question.clone(),
                explanation: question.explanation.clone(),
                corr_ans: question.corr_ans,
                title: question.title.clone(),
                image: question.image.clone(),
                images,
                people_taken: question.people_taken,
                corr_taken: question.corr_taken,
                subject_id: question.subject_id,
                system_id: question.system_id,
                subject_name: None,
                system_name: None,
            },
        )?;
        for answer in &question.answers {
            Answer::add(
                &tx,
                &Answer {
                    id: 0,
                    answer_text: answer.answer.clone(),
                    correct_percentage: answer.correct_percentage,
                    q_id: id,
                },
            )?;
        }
        info!("{} {}", "│".blue(), format!("├ Question: {} ({} answers)", id, question.answers.len()).green());
        summary.questions += 1;
    }

    tx.commit()?;
    Ok(summary)
}

fn export_bank(db: &Connection) -> rusqlite::Result<BankJson> {
    let group = |s: Subject| GroupJson { id: s.id, name: s.name };
    let subjects = Subject::get_all(db)?.into_iter().map(group).collect();
    let systems = Subject::get_all_systems(db)?.into_iter().map(group).collect();

    let mut questions = Vec::new();
    for question in Question::get_all(db)? {
        let answers = Answer::get_for_question(db, question.id)?
            .into_iter()
            .map(|a| AnswerJson {
                answer: a.answer_text,
                correct_percentage: a.correct_percentage,
            })
            .collect();
        questions.push(QuestionJson {
            id: Some(question.id),
            images: question.additional_images(),
            question: question.question,
            explanation: question.explanation,
            corr_ans: question.corr_ans,
            title: question.title,
            image: question.image,
            people_taken: question.people_taken,
            corr_taken: question.corr_taken,
            subject_id: question.subject_id,
            system_id: question.system_id,
            answers,
        });
    }

    Ok(BankJson {
        subjects,
        systems,
        questions,
    })
}
