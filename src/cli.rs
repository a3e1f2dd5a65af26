use colored::Colorize;
#[cfg(feature = "kittygfx")]
use kitty_image::{Action, Command, WrappedCommand};
use log::debug;
use medquiz::quiz::{Outcome, QuizItem, QuizSession};
use medquiz::settings::Settings;
use medquiz::Error;
use rusqlite::Connection;
use std::path::Path;
use text_io::read;

#[derive(Debug, PartialEq)]
pub enum Choice {
    Option(usize),
    DontKnow,
    Quit,
}

impl Choice {
    pub fn from_str(choices_count: usize, input: &str) -> Choice {
        match input.trim() {
            "q" => Choice::Quit,
            input => match input.parse::<usize>() {
                Ok(num) if num >= 1 && num <= choices_count => Choice::Option(num - 1),
                Ok(_) => {
                    println!(
                        "{}",
                        format!("There are only {} options available!", choices_count).bright_red()
                    );
                    Choice::DontKnow
                }
                Err(_) => Choice::DontKnow,
            },
        }
    }
}

/// Kitty is told the file is PNG, so only those go through it.
#[cfg_attr(not(feature = "kittygfx"), allow(dead_code))]
fn is_png(file: &str) -> bool {
    Path::new(file)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn print_question(item: &QuizItem, leading: &str, media_dir: &Path) {
    let header = match &item.question.title {
        Some(title) => format!("{} ({})", title, item.question.id),
        None => format!("#{}", item.question.id),
    };
    println!("{}{}", leading.cyan(), header.black().bold().on_white());
    if let Some(subject) = &item.question.subject_name {
        let system = item.question.system_name.as_deref().unwrap_or("-");
        println!("{}", format!("{} / {}", subject, system).dimmed());
    }
    println!("{}", item.question.question);

    for file in item.media() {
        let path = media_dir.join(&file);
        debug!("media at {path:?}");
        #[cfg(feature = "kittygfx")]
        if is_png(&file) {
            if let Ok((width, height)) = image::image_dimensions(&path) {
                let action = Action::TransmitAndDisplay(
                    kitty_image::ActionTransmission {
                        format: kitty_image::Format::Png,
                        medium: kitty_image::Medium::File,
                        width,
                        height,
                        ..Default::default()
                    },
                    kitty_image::ActionPut {
                        x_offset: 10 * leading.len() as u32,
                        ..Default::default()
                    },
                );
                let command = WrappedCommand::new(Command::with_payload_from_path(action, &path));
                println!("{command}");
                print!("{}", "\n".repeat(height as usize / 20));
                continue;
            }
        }
        println!("{}", format!("[image: {}]", path.display()).dimmed());
    }

    let indent = " ".repeat(leading.len());
    for (i, answer) in item.answers.iter().enumerate() {
        println!("{}{}. {}", indent, format!("{}", i + 1).bold(), answer.answer_text);
    }
}

fn print_outcome(item: &QuizItem, outcome: Outcome) {
    match outcome {
        Outcome::Correct => println!("{}", "Correct!".bright_green()),
        Outcome::Incorrect { correct } | Outcome::Skipped { correct } => {
            if matches!(outcome, Outcome::Incorrect { .. }) {
                println!("{}", "Incorrect!".bright_red());
            }
            println!(
                "{}",
                format!("The correct choice was {}. {}", correct + 1, item.answers[correct].answer_text).green()
            );
        }
    }
    if let Some(rate) = item.question.success_rate() {
        println!("{}", format!("{:.0}% of people got this right.", rate * 100.0).dimmed());
    }
    println!("{}\n", item.question.explanation.italic());
}

pub fn cli_loop(
    conn: &Connection,
    settings: &Settings,
    session: &mut QuizSession,
    media_dir: &Path,
) -> Result<(), Error> {
    let total = session.len();
    while let Some(item) = session.current().cloned() {
        let leading = format!("{}/{}. ", session.position() + 1, total);
        print_question(&item, &leading, media_dir);

        print!(
            "{} ",
            format!(
                "Answer (1-{}, q to quit prematurely and anything else if you don't know):",
                item.answers.len()
            )
            .cyan()
        );
        let choice_string: String = read!("{}\n");
        let choice = Choice::from_str(item.answers.len(), choice_string.as_str());
        debug!("choice: {:?}", choice);

        let picked = match choice {
            Choice::Option(num) => Some(num),
            Choice::DontKnow => None,
            Choice::Quit => {
                println!("{}", "Quitting Early!".cyan());
                break;
            }
        };
        if let Some(outcome) = session.submit(conn, settings.is_logging_enabled(), picked)? {
            print_outcome(&item, outcome);
        }
    }

    let score = session.score();
    println!(
        "{}",
        format!("==========> Score: {}/{} <==========", score.correct, score.answered).cyan()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_parsing() {
        assert_eq!(Choice::from_str(4, "q"), Choice::Quit);
        assert_eq!(Choice::from_str(4, "1"), Choice::Option(0));
        assert_eq!(Choice::from_str(4, " 4 "), Choice::Option(3));
        assert_eq!(Choice::from_str(4, "5"), Choice::DontKnow);
        assert_eq!(Choice::from_str(4, "0"), Choice::DontKnow);
        assert_eq!(Choice::from_str(4, "dunno"), Choice::DontKnow);
    }

    #[test]
    fn test_only_png_media_goes_to_kitty() {
        assert!(is_png("ecg.png"));
        assert!(is_png("scans/CT.PNG"));
        assert!(!is_png("xray.jpg"));
        assert!(!is_png("murmur.gif"));
        assert!(!is_png("heart.svg"));
        assert!(!is_png("png"));
    }
}
