use clap::Parser;
use colored::Colorize;
use env_logger::Env;
use log::{debug, error, info, warn};
use medquiz::db;
use medquiz::images::{self, new_image_loader};
use medquiz::platform::{DesktopEnv, Platform};
use medquiz::quiz::{init_quiz, pick_questions, pick_subject, QuizSession};
use medquiz::settings::Settings;
use medquiz::Error;
use rusqlite::Connection;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;
#[cfg(feature = "gui")]
mod gui;

#[derive(Parser, Debug)]
#[command(name = "Medical Quiz")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "quiz.db")]
    db: String,
    /// Where the settings file lives. Defaults to the user config directory.
    #[arg(long, value_name = "DIR")]
    settings_dir: Option<PathBuf>,
    #[arg(short, long, value_name = "DIR", default_value = "media")]
    media_dir: PathBuf,
    #[arg(long)]
    subject: Option<String>,
    #[arg(short, long, default_value = "20")]
    question_count: usize,
    /// Memory budget the image cache is sized from, in MiB. Defaults to what the host reports.
    #[arg(long, value_name = "MIB")]
    image_memory_mb: Option<u64>,
    #[arg(long)]
    no_dynamic_color: bool,
    /// Persistently turn answer logging on or off.
    #[arg(long, value_name = "BOOL")]
    log_answers: Option<bool>,
    /// Run the terminal quiz instead of the window.
    #[arg(long)]
    cli: bool,
    #[arg(short, long, default_value = "error")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?}", err);
            eprintln!("{}", err.to_string().bright_red());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    //INIT START
    let platform = Platform::current(DesktopEnv::resolve(args.image_memory_mb));
    let conn = platform.database_builder(&args.db)?.build()?;
    debug!("[DB] Database Connection Successful!");

    let loader = images::set_default(new_image_loader(&platform)?)?;

    let settings_dir = args
        .settings_dir
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("medquiz")))
        .unwrap_or_else(|| PathBuf::from("."));
    let mut settings = Settings::open(&settings_dir);
    if let Some(enabled) = args.log_answers {
        if let Err(err) = settings.set_logging_enabled(enabled) {
            warn!("[Setup] {}", err);
        }
    }
    info!(
        "[Setup] Settings at {:?}, answer logging {}",
        settings.path(),
        settings.is_logging_enabled()
    );
    // INIT DONE

    #[cfg(feature = "gui")]
    {
        if !args.cli {
            let result = gui::init_gui(
                &conn,
                settings,
                gui::GuiConfig {
                    platform,
                    loader,
                    media_dir: args.media_dir,
                    question_count: args.question_count,
                    dynamic_color: !args.no_dynamic_color,
                },
            );
            return finish(conn, result);
        }
    }
    #[cfg(not(feature = "gui"))]
    let _ = loader;

    let subject = match pick_subject(&conn, args.subject.as_deref())? {
        Some(subject) => subject,
        None => {
            warn!("[Setup] No subjects found.");
            println!(
                "{}",
                "No subjects found. Come back when you have imported a question bank!".yellow()
            );
            return finish(conn, Err(Error::NoSubjects));
        }
    };
    debug!("[Setup] Picked subject {:?}", subject);

    let questions = pick_questions(&conn, Some(&subject), args.question_count)?;
    let mut session = QuizSession::new(init_quiz(&conn, questions)?);
    println!(
        "{}",
        format!("==========> {} ({} questions) <==========", subject.name, session.len()).cyan()
    );

    let result = cli::cli_loop(&conn, &settings, &mut session, &args.media_dir);
    finish(conn, result)
}

fn finish(conn: Connection, to_error: Result<(), Error>) -> Result<(), Error> {
    db::close_db(conn)?;
    to_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquiz::platform::desktop_database_builder;

    #[test]
    fn test_finish_closes_and_keeps_front_end_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiz.db");
        let builder = desktop_database_builder(path.to_str().unwrap());

        let conn = builder.build().unwrap();
        assert!(finish(conn, Ok(())).is_ok());

        let conn = builder.build().unwrap();
        assert!(matches!(finish(conn, Err(Error::NoSubjects)), Err(Error::NoSubjects)));
    }

    #[test]
    fn test_image_budget_flag_is_optional() {
        let args = Args::try_parse_from(["medquiz"]).unwrap();
        assert_eq!(args.image_memory_mb, None);

        let args = Args::try_parse_from(["medquiz", "--image-memory-mb", "512"]).unwrap();
        assert_eq!(args.image_memory_mb, Some(512));
    }
}
