use eframe::egui;
use eframe::egui::{Color32, RichText, ScrollArea, TextureHandle, TextureOptions, Ui};
use egui_extras::{Column, TableBuilder};
use log::{debug, error, warn};
use medquiz::images::ImageLoader;
use medquiz::models::Subject;
use medquiz::platform::Platform;
use medquiz::quiz::{init_quiz, pick_questions, Outcome, QuizItem, QuizSession};
use medquiz::settings::Settings;
use medquiz::theme::quiz_theme;
use medquiz::Error;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const CORRECT_COLOR: Color32 = Color32::from_rgb(56, 142, 60);

pub struct GuiConfig {
    pub platform: Platform<'static>,
    pub loader: Arc<ImageLoader>,
    pub media_dir: PathBuf,
    pub question_count: usize,
    pub dynamic_color: bool,
}

struct Review {
    item: QuizItem,
    picked: Option<usize>,
    outcome: Outcome,
}

enum Action {
    Start(Option<Subject>),
    Answer(Option<usize>),
    Next,
    SetLogging(bool),
}

/// Textures uploaded for the item on screen. Pixels stay bounded by the image
/// loader's cache, so this is dropped whenever the item changes.
struct MediaTextures<T> {
    loaded: HashMap<String, (T, Instant)>,
    failed: HashSet<String>,
}

impl<T> MediaTextures<T> {
    fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    fn get(&self, file: &str) -> Option<&(T, Instant)> {
        self.loaded.get(file)
    }

    fn insert(&mut self, file: &str, texture: T) {
        self.failed.remove(file);
        self.loaded.insert(file.to_string(), (texture, Instant::now()));
    }

    fn mark_failed(&mut self, file: &str) {
        self.failed.insert(file.to_string());
    }

    fn has_failed(&self, file: &str) -> bool {
        self.failed.contains(file)
    }

    fn len(&self) -> usize {
        self.loaded.len()
    }

    /// Forget everything, failures included so they get retried.
    fn clear(&mut self) {
        if self.len() > 0 || !self.failed.is_empty() {
            debug!(
                "[GUI] Dropping {} textures, {} failed media",
                self.len(),
                self.failed.len()
            );
        }
        self.loaded.clear();
        self.failed.clear();
    }
}

struct GuiState<'a> {
    conn: &'a Connection,
    settings: Settings,
    config: GuiConfig,

    subjects: Vec<Subject>,
    session: Option<QuizSession>,
    review: Option<Review>,
    textures: MediaTextures<TextureHandle>,
    status: Option<String>,
}

impl<'a> GuiState<'a> {
    fn new(conn: &'a Connection, settings: Settings, config: GuiConfig) -> Self {
        let subjects = Subject::get_all(conn).unwrap_or_else(|err| {
            error!("[GUI] Cannot load subjects: {}", err);
            Vec::new()
        });

        Self {
            conn,
            settings,
            config,

            subjects,
            session: None,
            review: None,
            textures: MediaTextures::new(),
            status: None,
        }
    }

    fn start(&mut self, subject: Option<Subject>) -> Result<(), Error> {
        let questions = pick_questions(self.conn, subject.as_ref(), self.config.question_count)?;
        let items = init_quiz(self.conn, questions)?;
        debug!("[GUI] Starting quiz with {} questions", items.len());
        self.status = items.is_empty().then(|| "No questions available.".to_string());
        self.session = Some(QuizSession::new(items));
        self.review = None;
        self.textures.clear();
        Ok(())
    }

    fn handle(&mut self, action: Action) {
        let result = match action {
            Action::Start(subject) => self.start(subject),
            Action::Answer(picked) => self.answer(picked),
            Action::Next => {
                self.review = None;
                self.textures.clear();
                Ok(())
            }
            Action::SetLogging(enabled) => match self.settings.set_logging_enabled(enabled) {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!("[GUI] Setting kept for this session only: {}", err);
                    self.status = Some(format!("Could not save settings: {err}"));
                    Ok(())
                }
            },
        };
        if let Err(err) = result {
            error!("[GUI] {}", err);
            self.status = Some(err.to_string());
        }
    }

    fn answer(&mut self, picked: Option<usize>) -> Result<(), Error> {
        let log_answers = self.settings.is_logging_enabled();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(item) = session.current().cloned() else {
            return Ok(());
        };
        if let Some(outcome) = session.submit(self.conn, log_answers, picked)? {
            self.review = Some(Review { item, picked, outcome });
        }
        Ok(())
    }

    /// Texture for a media file and its cross-fade opacity.
    fn texture(&mut self, ctx: &egui::Context, file: &str) -> Option<(TextureHandle, f32)> {
        if self.textures.has_failed(file) {
            return None;
        }
        if self.textures.get(file).is_none() {
            let path = self.config.media_dir.join(file);
            match self.config.loader.load(&path) {
                Ok(image) => {
                    let handle = ctx.load_texture(file, image.to_color_image(), TextureOptions::LINEAR);
                    self.textures.insert(file, handle);
                }
                Err(err) => {
                    warn!("[GUI] Cannot load {}: {}", file, err);
                    self.textures.mark_failed(file);
                    return None;
                }
            }
        }
        let (handle, loaded_at) = self.textures.get(file)?;
        let opacity = match self.config.loader.crossfade() {
            Some(duration) if !duration.is_zero() => {
                (loaded_at.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0)
            }
            _ => 1.0,
        };
        if opacity < 1.0 {
            ctx.request_repaint();
        }
        Some((handle.clone(), opacity))
    }

    fn draw_media(&mut self, ui: &mut Ui, item: &QuizItem) {
        for file in item.media() {
            match self.texture(ui.ctx(), &file) {
                Some((texture, opacity)) => {
                    let alpha = (opacity * 255.0).round() as u8;
                    ui.add(
                        egui::Image::from_texture(&texture)
                            .max_width(ui.available_width().min(480.0))
                            .tint(Color32::from_white_alpha(alpha)),
                    );
                }
                None => {
                    ui.weak(format!("[image unavailable: {file}]"));
                }
            }
        }
    }

    fn draw_header(ui: &mut Ui, item: &QuizItem) {
        if let Some(title) = &item.question.title {
            ui.heading(title);
        }
        if let Some(subject) = &item.question.subject_name {
            let system = item.question.system_name.as_deref().unwrap_or("-");
            ui.weak(format!("{subject} / {system}"));
        }
        ui.add_space(8.0);
        ui.label(RichText::new(&item.question.question).size(18.0));
        ui.add_space(8.0);
    }

    fn draw_question(&mut self, ui: &mut Ui, item: &QuizItem, actions: &mut Vec<Action>) {
        Self::draw_header(ui, item);
        self.draw_media(ui, item);
        ui.add_space(12.0);

        let width = ui.available_width();
        for (idx, answer) in item.answers.iter().enumerate() {
            let text = format!("{}. {}", idx + 1, answer.answer_text);
            if ui
                .add(egui::Button::new(text).min_size(egui::vec2(width, 32.0)))
                .clicked()
            {
                actions.push(Action::Answer(Some(idx)));
            }
        }
        ui.add_space(8.0);
        if ui.button("I don't know").clicked() {
            actions.push(Action::Answer(None));
        }
    }

    fn draw_review(&mut self, ui: &mut Ui, review: &Review, actions: &mut Vec<Action>) {
        let item = &review.item;
        Self::draw_header(ui, item);
        self.draw_media(ui, item);
        ui.add_space(12.0);

        let error_color = ui.visuals().error_fg_color;
        let correct = match review.outcome {
            Outcome::Correct => {
                ui.colored_label(CORRECT_COLOR, RichText::new("Correct!").strong());
                review.picked
            }
            Outcome::Incorrect { correct } => {
                ui.colored_label(error_color, RichText::new("Incorrect!").strong());
                Some(correct)
            }
            Outcome::Skipped { correct } => Some(correct),
        };

        for (idx, answer) in item.answers.iter().enumerate() {
            let mut text = format!("{}. {}", idx + 1, answer.answer_text);
            if let Some(percentage) = answer.correct_percentage {
                text.push_str(&format!("  ({percentage:.0}%)"));
            }
            let rich = RichText::new(text);
            if Some(idx) == correct {
                ui.colored_label(CORRECT_COLOR, rich.strong());
            } else if Some(idx) == review.picked {
                ui.colored_label(error_color, rich);
            } else {
                ui.label(rich);
            }
        }

        if let Some(rate) = item.question.success_rate() {
            ui.weak(format!("{:.0}% of people got this right.", rate * 100.0));
        }
        ui.separator();
        ui.label(RichText::new(&item.question.explanation).italics());
        ui.add_space(12.0);
        if ui.button("Next").clicked() {
            actions.push(Action::Next);
        }
    }

    fn draw_subjects(&self, ui: &mut Ui, actions: &mut Vec<Action>) {
        ui.heading("Subjects");
        if ui.button("Random questions").clicked() {
            actions.push(Action::Start(None));
        }
        ui.add_space(8.0);

        TableBuilder::new(ui)
            .striped(true)
            .column(Column::remainder())
            .column(Column::auto())
            .column(Column::auto())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Subject");
                });
                header.col(|ui| {
                    ui.strong("#");
                });
                header.col(|_| {});
            })
            .body(|mut body| {
                for subject in &self.subjects {
                    body.row(24.0, |mut row| {
                        row.col(|ui| {
                            ui.label(&subject.name);
                        });
                        row.col(|ui| {
                            ui.label(subject.count.unwrap_or(0).to_string());
                        });
                        row.col(|ui| {
                            if ui.small_button("Start").clicked() {
                                actions.push(Action::Start(Some(subject.clone())));
                            }
                        });
                    });
                }
            });
    }

    fn draw(&mut self, ctx: &egui::Context) {
        let mut actions = Vec::new();

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Medical Quiz");
                ui.separator();
                let mut logging = self.settings.is_logging_enabled();
                if ui.checkbox(&mut logging, "Log answers").changed() {
                    actions.push(Action::SetLogging(logging));
                }
                if let Some(session) = &self.session {
                    let score = session.score();
                    ui.separator();
                    ui.label(format!(
                        "{}/{} · score {}/{}",
                        session.position().min(session.len()),
                        session.len(),
                        score.correct,
                        score.answered
                    ));
                }
            });
            if let Some(status) = &self.status {
                ui.weak(status);
            }
        });

        egui::SidePanel::left("subjects")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| self.draw_subjects(ui, &mut actions));

        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical().auto_shrink(false).show(ui, |ui| {
                if let Some(review) = self.review.take() {
                    self.draw_review(ui, &review, &mut actions);
                    self.review = Some(review);
                    return;
                }
                let current = self.session.as_ref().and_then(|s| s.current().cloned());
                if let Some(item) = current {
                    self.draw_question(ui, &item, &mut actions);
                    return;
                }
                match &self.session {
                    Some(session) if !session.is_empty() => {
                        let score = session.score();
                        ui.heading(format!("Finished! {}/{} correct", score.correct, score.answered));
                        ui.label("Pick a subject to start again.");
                    }
                    _ => {
                        ui.heading("Pick a subject to start a quiz.");
                    }
                }
            });
        });

        for action in actions {
            self.handle(action);
        }
    }
}

impl eframe::App for GuiState<'_> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dark = ctx
            .input(|i| i.raw.system_theme)
            .map_or(true, |theme| theme == egui::Theme::Dark);
        let host = self.config.platform.theme_host(dark);
        quiz_theme(ctx, self.config.dynamic_color, &host, |ctx| self.draw(ctx));
    }
}

/// Runs the window until it is closed. The connection is borrowed so the
/// caller closes it the same way the terminal quiz does.
pub fn init_gui(conn: &Connection, settings: Settings, config: GuiConfig) -> Result<(), Error> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 640.0])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Medical Quiz",
        native_options,
        Box::new(|_cc| Ok(Box::new(GuiState::new(conn, settings, config)))),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textures_dropped_and_failures_retried_on_clear() {
        let mut textures = MediaTextures::new();
        textures.insert("ecg.png", 1u32);
        textures.insert("xray.svg", 2u32);
        textures.mark_failed("missing.png");
        assert_eq!(textures.len(), 2);
        assert!(textures.has_failed("missing.png"));

        textures.clear();
        assert_eq!(textures.len(), 0);
        assert!(textures.get("ecg.png").is_none());
        assert!(!textures.has_failed("missing.png"));
    }

    #[test]
    fn test_loading_clears_earlier_failure() {
        let mut textures = MediaTextures::new();
        textures.mark_failed("ecg.png");
        textures.insert("ecg.png", 7u32);
        assert!(!textures.has_failed("ecg.png"));
        assert_eq!(textures.get("ecg.png").map(|(t, _)| *t), Some(7));
    }
}
