//! Multi-Cloud Chat desktop client.
//!
//! Sidebar with saved conversations, a chat area, an image-generation
//! view, and a settings window. All requests go through the backend
//! proxy; see the `backend` crate for the wire contract.

use eframe::egui;
use shared::api::{ChatMessage, Role, Usage};

mod i18n;
mod markdown;
mod sessions;
mod state;
mod types;
mod utils;

use i18n::{tr, Lang};
use markdown::{Block, RenderedMessage, Span};
use sessions::{Agent, JsonHistoryStore};
use types::{AppState, View};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([820.0, 600.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Multi-Cloud Chat",
        options,
        Box::new(|cc| Box::new(ChatApp::new(cc))),
    )
}

struct ChatApp {
    state: AppState,
    last_title: String,
}

impl ChatApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Self {
        install_cjk_fonts(&cc.egui_ctx);

        let settings = utils::load_settings_or_default();
        let store = JsonHistoryStore::new(JsonHistoryStore::default_path());
        let mut state = AppState::new(settings, Box::new(store));
        state.request_config();

        Self {
            state,
            last_title: String::new(),
        }
    }
}

/// egui's bundled fonts have no CJK coverage; pull in a system font when
/// one is available so the Chinese UI renders.
fn install_cjk_fonts(ctx: &egui::Context) {
    let candidates = [
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/System/Library/Fonts/PingFang.ttc",
        "C:\\Windows\\Fonts\\msyh.ttc",
    ];
    for path in candidates {
        if let Ok(bytes) = std::fs::read(path) {
            let mut fonts = egui::FontDefinitions::default();
            fonts
                .font_data
                .insert("cjk".to_string(), egui::FontData::from_owned(bytes));
            for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
                if let Some(list) = fonts.families.get_mut(&family) {
                    list.push("cjk".to_string());
                }
            }
            ctx.set_fonts(fonts);
            return;
        }
    }
    tracing::warn!("no CJK font found; Chinese labels may not render");
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let s = &mut self.state;

        // Drain worker channels (non-blocking) before drawing.
        s.poll_chat_outcome();
        s.poll_image_outcome();
        s.poll_background_fetches();
        s.service_usage_refresh();
        s.finish_gallery_images(ctx);

        if s.wants_repaint() {
            ctx.request_repaint();
        }

        let dark = s.settings.dark_mode();
        ctx.set_visuals(if dark {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });

        let title = s.app_name().to_string();
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }

        draw_sidebar(ctx, s, dark);
        draw_settings_window(ctx, s);
        draw_alert(ctx, s);

        match s.view {
            View::Chat => draw_chat_view(ctx, s, dark),
            View::ImageGen => draw_image_view(ctx, s),
        }
    }
}

fn draw_sidebar(ctx: &egui::Context, s: &mut AppState, dark: bool) {
    let lang = s.lang();

    egui::SidePanel::left("sidebar")
        .resizable(false)
        .exact_width(250.0)
        .show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading(s.app_name());

            if let Some(usage) = s.usage {
                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(tr(lang, "freeUsage")).size(12.0).weak());
                    ui.label(
                        egui::RichText::new(format!("{}/{}", usage.used, usage.limit))
                            .size(12.0)
                            .color(quota_color(usage, dark)),
                    );
                });
                ui.label(egui::RichText::new(tr(lang, "quotaHint")).size(10.0).weak());
            }

            ui.add_space(8.0);
            ui.separator();
            ui.add_space(8.0);

            let chat_active = s.view == View::Chat && s.session.agent == Agent::Default;
            let counselor_active = s.view == View::Chat && s.session.agent == Agent::Counselor;
            let image_active = s.view == View::ImageGen;

            if ui
                .selectable_label(chat_active, format!("✚  {}", tr(lang, "newChat")))
                .clicked()
            {
                s.new_chat();
            }
            if ui
                .selectable_label(counselor_active, format!("👤  {}", tr(lang, "counselor")))
                .clicked()
            {
                s.open_counselor();
            }
            if ui
                .selectable_label(image_active, format!("🖼  {}", tr(lang, "imageGen")))
                .clicked()
            {
                s.view = View::ImageGen;
            }

            ui.add_space(8.0);
            ui.separator();
            ui.label(egui::RichText::new(tr(lang, "chatHistory")).size(12.0).weak());
            ui.add_space(4.0);

            // Snapshot first: row clicks mutate the history being listed.
            let rows: Vec<(String, String, bool)> = s
                .history
                .iter()
                .map(|c| {
                    let active = s.session.current_chat_id.as_deref() == Some(c.id.as_str());
                    (c.id.clone(), c.title.clone(), active)
                })
                .collect();

            let mut load_id = None;
            let mut delete_id = None;

            egui::ScrollArea::vertical()
                .max_height(ui.available_height() - 70.0)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    if rows.is_empty() {
                        ui.label(
                            egui::RichText::new(tr(lang, "chatHistoryEmpty"))
                                .size(12.0)
                                .weak()
                                .italics(),
                        );
                    }
                    for (id, title, active) in &rows {
                        ui.horizontal(|ui| {
                            if ui
                                .selectable_label(*active, egui::RichText::new(title).size(13.0))
                                .clicked()
                            {
                                load_id = Some(id.clone());
                            }
                            ui.with_layout(
                                egui::Layout::right_to_left(egui::Align::Center),
                                |ui| {
                                    if ui
                                        .small_button("✕")
                                        .on_hover_text(tr(lang, "delete"))
                                        .clicked()
                                    {
                                        delete_id = Some(id.clone());
                                    }
                                },
                            );
                        });
                    }
                });

            if let Some(id) = load_id {
                s.load_chat(&id);
            }
            if let Some(id) = delete_id {
                s.delete_chat(&id);
            }

            ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button(format!("⚙ {}", tr(lang, "settings"))).clicked() {
                        s.show_settings = !s.show_settings;
                    }
                    let theme_label = if dark {
                        tr(lang, "lightMode")
                    } else {
                        tr(lang, "darkMode")
                    };
                    if ui.button(theme_label).clicked() {
                        s.settings.theme = (if dark { "light" } else { "dark" }).to_string();
                        utils::save_settings(&s.settings);
                    }
                    let lang_label = match lang {
                        Lang::Zh => "EN",
                        Lang::En => "中文",
                    };
                    if ui.button(lang_label).clicked() {
                        s.settings.language = lang.toggled().code().to_string();
                        utils::save_settings(&s.settings);
                    }
                });
            });
        });
}

fn quota_color(usage: Usage, dark: bool) -> egui::Color32 {
    if usage.remaining == 0 {
        egui::Color32::from_rgb(248, 81, 73)
    } else if usage.remaining <= usage.limit / 5 {
        egui::Color32::from_rgb(210, 153, 34)
    } else if dark {
        egui::Color32::from_rgb(220, 220, 230)
    } else {
        egui::Color32::from_rgb(40, 40, 50)
    }
}

fn draw_chat_view(ctx: &egui::Context, s: &mut AppState, dark: bool) {
    let lang = s.lang();

    egui::CentralPanel::default().show(ctx, |ui| {
        let input_height = 66.0;
        let chat_height = ui.available_height() - input_height;

        let messages = s.session.messages.clone();
        let projected = markdown::project(&messages);
        let thinking = s.chat_latch.is_in_flight();
        let counselor = s.session.agent == Agent::Counselor;

        egui::ScrollArea::vertical()
            .max_height(chat_height)
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                if messages.is_empty() && !thinking {
                    draw_welcome(ui, lang, counselor);
                } else {
                    for (msg, rendered) in messages.iter().zip(&projected) {
                        ui.add_space(6.0);
                        draw_message(ui, msg, rendered, dark);
                        ui.add_space(6.0);
                    }
                    if thinking {
                        draw_thinking(ui, lang, dark);
                        ctx.request_repaint();
                    }
                }
            });

        ui.add_space(8.0);

        ui.horizontal(|ui| {
            let response = ui.add_sized(
                [ui.available_width() - 80.0, 48.0],
                egui::TextEdit::multiline(&mut s.input_text)
                    .desired_rows(2)
                    .hint_text(tr(lang, "placeholder"))
                    .font(egui::FontId::new(15.0, egui::FontFamily::Proportional)),
            );
            let enter_sends = response.has_focus()
                && ui.input(|i| i.key_pressed(egui::Key::Enter) && !i.modifiers.shift);

            let send_btn = egui::Button::new(
                egui::RichText::new(tr(lang, "send")).color(egui::Color32::WHITE),
            )
            .fill(egui::Color32::from_rgb(70, 130, 180));
            let clicked = ui.add_sized([70.0, 48.0], send_btn).clicked();

            if enter_sends || clicked {
                // The Enter that triggered the send also typed a newline.
                s.input_text = s.input_text.trim_end().to_string();
                s.send_message();
            }
        });
    });
}

fn draw_welcome(ui: &mut egui::Ui, lang: Lang, counselor: bool) {
    ui.add_space(90.0);
    ui.vertical_centered(|ui| {
        ui.set_max_width(640.0);
        if counselor {
            ui.label(egui::RichText::new("👤").size(48.0));
            ui.add_space(12.0);
            ui.heading(tr(lang, "counselor"));
            ui.add_space(8.0);
            ui.add(
                egui::Label::new(egui::RichText::new(tr(lang, "counselorIntro")).size(14.0))
                    .wrap(true),
            );
        } else {
            ui.label(egui::RichText::new("✨").size(48.0));
            ui.add_space(12.0);
            ui.heading(tr(lang, "title"));
            ui.add_space(8.0);
            ui.label(egui::RichText::new(tr(lang, "subtitle")).weak());
        }
    });
}

fn draw_thinking(ui: &mut egui::Ui, lang: Lang, dark: bool) {
    ui.add_space(6.0);
    egui::Frame::none()
        .fill(if dark {
            egui::Color32::from_rgb(50, 50, 58)
        } else {
            egui::Color32::from_rgb(230, 230, 235)
        })
        .rounding(egui::Rounding::same(12.0))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            let time = ui.input(|i| i.time);
            let dots = match ((time * 2.0) as i32) % 4 {
                0 => "   ",
                1 => ".  ",
                2 => ".. ",
                _ => "...",
            };
            ui.label(
                egui::RichText::new(format!("{}{}", tr(lang, "thinking"), dots))
                    .color(if dark {
                        egui::Color32::from_rgb(160, 160, 180)
                    } else {
                        egui::Color32::from_rgb(60, 60, 70)
                    })
                    .italics(),
            );
        });
}

fn draw_message(ui: &mut egui::Ui, msg: &ChatMessage, rendered: &RenderedMessage, dark: bool) {
    if msg.role == Role::User {
        // User message: right aligned, blue, always literal text.
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
            ui.add_space(8.0);
            egui::Frame::none()
                .fill(egui::Color32::from_rgb(70, 130, 180))
                .rounding(egui::Rounding::same(12.0))
                .inner_margin(egui::Margin::same(12.0))
                .show(ui, |ui| {
                    ui.set_max_width(500.0);
                    ui.label(
                        egui::RichText::new(&msg.content)
                            .color(egui::Color32::WHITE)
                            .size(15.0),
                    );
                });
        });
    } else {
        egui::Frame::none()
            .fill(if dark {
                egui::Color32::from_rgb(50, 50, 58)
            } else {
                egui::Color32::from_rgb(245, 245, 248)
            })
            .rounding(egui::Rounding::same(12.0))
            .inner_margin(egui::Margin::same(12.0))
            .show(ui, |ui| {
                ui.set_max_width(600.0);
                draw_blocks(ui, &rendered.blocks, dark);

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.small_button("Copy").clicked() {
                        ui.output_mut(|o| o.copied_text = msg.content.clone());
                    }
                });
            });
    }
}

fn draw_blocks(ui: &mut egui::Ui, blocks: &[Block], dark: bool) {
    let text_color = if dark {
        egui::Color32::from_rgb(220, 220, 230)
    } else {
        egui::Color32::from_rgb(40, 40, 50)
    };
    let link_color = egui::Color32::from_rgb(100, 170, 240);
    let code_bg = if dark {
        egui::Color32::from_rgb(60, 60, 70)
    } else {
        egui::Color32::from_rgb(230, 232, 236)
    };

    for block in blocks {
        match block {
            Block::Blank => ui.add_space(6.0),
            Block::Heading { level, text } => {
                let (size, space) = match level {
                    1 => (18.0, 8.0),
                    2 => (16.0, 6.0),
                    3 => (15.0, 5.0),
                    _ => (14.0, 4.0),
                };
                ui.add_space(space);
                ui.label(
                    egui::RichText::new(text)
                        .strong()
                        .size(size)
                        .color(text_color),
                );
                ui.add_space(space / 2.0);
            }
            Block::Bullet(spans) => {
                ui.horizontal_wrapped(|ui| {
                    ui.label(egui::RichText::new("  •  ").size(14.0).color(text_color));
                    draw_spans(ui, spans, text_color, link_color, code_bg);
                });
            }
            Block::Paragraph(spans) => {
                ui.horizontal_wrapped(|ui| {
                    draw_spans(ui, spans, text_color, link_color, code_bg);
                });
            }
        }
    }
}

fn draw_spans(
    ui: &mut egui::Ui,
    spans: &[Span],
    text_color: egui::Color32,
    link_color: egui::Color32,
    code_bg: egui::Color32,
) {
    let size = 14.0;
    for span in spans {
        match span {
            Span::Text(text) => {
                ui.label(egui::RichText::new(text).size(size).color(text_color));
            }
            Span::Bold(text) => {
                ui.label(
                    egui::RichText::new(text)
                        .size(size)
                        .strong()
                        .color(text_color),
                );
            }
            Span::Code(text) => {
                egui::Frame::none()
                    .fill(code_bg)
                    .rounding(egui::Rounding::same(3.0))
                    .inner_margin(egui::Margin::symmetric(4.0, 1.0))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(text)
                                .size(size)
                                .monospace()
                                .color(text_color),
                        );
                    });
            }
            Span::Link { text, url } => {
                ui.hyperlink_to(
                    egui::RichText::new(text)
                        .size(size)
                        .color(link_color)
                        .underline(),
                    url,
                );
            }
        }
    }
}

fn draw_image_view(ctx: &egui::Context, s: &mut AppState) {
    let lang = s.lang();

    egui::CentralPanel::default().show(ctx, |ui| {
        ui.add_space(8.0);
        ui.heading(tr(lang, "imageGen"));
        ui.add_space(8.0);

        let generating = s.image_latch.is_in_flight();

        ui.horizontal(|ui| {
            ui.add_sized(
                [ui.available_width() - 110.0, 36.0],
                egui::TextEdit::singleline(&mut s.image_prompt)
                    .hint_text(tr(lang, "imagePromptPlaceholder")),
            );
            let label = if generating {
                tr(lang, "generating")
            } else {
                tr(lang, "generateImage")
            };
            let btn = egui::Button::new(egui::RichText::new(label).color(egui::Color32::WHITE))
                .fill(egui::Color32::from_rgb(70, 130, 180));
            if ui.add_enabled(!generating, btn).clicked() {
                s.generate_image();
            }
        });

        ui.add_space(12.0);

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if generating {
                    ui.label(egui::RichText::new(tr(lang, "generating")).italics().weak());
                    ctx.request_repaint();
                }
                for img in &s.gallery {
                    match &img.texture {
                        Some(texture) => {
                            ui.add(
                                egui::Image::new(texture)
                                    .max_width(420.0)
                                    .rounding(egui::Rounding::same(8.0)),
                            );
                            ui.horizontal(|ui| {
                                if ui.small_button("↗").on_hover_text(&img.url).clicked() {
                                    let _ = open::that(&img.url);
                                }
                            });
                        }
                        None => {
                            // Download or decode failed: the link still works.
                            ui.hyperlink(&img.url);
                        }
                    }
                    ui.add_space(10.0);
                }
            });
    });
}

fn draw_settings_window(ctx: &egui::Context, s: &mut AppState) {
    if !s.show_settings {
        return;
    }
    let lang = s.lang();
    let mut open_flag = true;
    let mut changed = false;
    let mut key_changed = false;
    let mut load_models = false;

    egui::Window::new(tr(lang, "settings"))
        .collapsible(false)
        .resizable(true)
        .open(&mut open_flag)
        .anchor(egui::Align2::RIGHT_TOP, [-12.0, 12.0])
        .show(ctx, |ui| {
            ui.set_min_width(380.0);

            ui.heading(tr(lang, "apiKeySettings"));
            ui.add_space(4.0);

            ui.label(tr(lang, "customApiKey"));
            let resp = ui.add(
                egui::TextEdit::singleline(&mut s.settings.chat.api_key).password(true),
            );
            if resp.changed() {
                changed = true;
                key_changed = true;
            }
            ui.label(egui::RichText::new(tr(lang, "apiKeyHint")).size(11.0).weak());

            ui.add_space(6.0);
            ui.label(tr(lang, "endpointUrl"));
            changed |= ui
                .text_edit_singleline(&mut s.settings.chat.endpoint_url)
                .changed();
            ui.label(
                egui::RichText::new(tr(lang, "endpointHint"))
                    .size(11.0)
                    .weak(),
            );

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.label(tr(lang, "model"));
                if ui
                    .small_button("⟳")
                    .on_hover_text(tr(lang, "modelSettings"))
                    .clicked()
                {
                    load_models = true;
                }
            });
            changed |= ui
                .text_edit_singleline(&mut s.settings.chat.model)
                .changed();

            let known_models: Vec<String> = s
                .model_catalog
                .as_ref()
                .map(|catalog| {
                    catalog
                        .aliyun
                        .iter()
                        .chain(catalog.openai.iter())
                        .map(|m| m.id.clone())
                        .collect()
                })
                .unwrap_or_default();
            for id in known_models {
                let selected = s.settings.chat.model == id;
                if ui
                    .selectable_label(selected, egui::RichText::new(&id).monospace().size(11.0))
                    .clicked()
                {
                    s.settings.chat.model = id;
                    changed = true;
                }
            }

            ui.add_space(8.0);
            ui.separator();
            ui.heading(tr(lang, "imageProvider"));
            ui.add_space(4.0);

            ui.label(tr(lang, "endpointUrl"));
            changed |= ui
                .text_edit_singleline(&mut s.settings.image.endpoint_url)
                .changed();

            ui.label(tr(lang, "customApiKey"));
            changed |= ui
                .add(egui::TextEdit::singleline(&mut s.settings.image.api_key).password(true))
                .changed();

            ui.label(tr(lang, "imageModel"));
            changed |= ui
                .text_edit_singleline(&mut s.settings.image.model)
                .changed();

            ui.label(tr(lang, "imageSize"));
            changed |= ui
                .text_edit_singleline(&mut s.settings.image.size)
                .changed();

            ui.add_space(8.0);
            ui.separator();
            ui.label(tr(lang, "serverUrl"));
            changed |= ui
                .text_edit_singleline(&mut s.settings.server_url)
                .changed();
        });

    if load_models {
        s.request_models();
    }
    if changed {
        utils::save_settings(&s.settings);
    }
    if key_changed {
        s.mark_usage_dirty();
    }
    if !open_flag {
        s.show_settings = false;
    }
}

fn draw_alert(ctx: &egui::Context, s: &mut AppState) {
    let Some(text) = s.alert.clone() else { return };
    let lang = s.lang();

    egui::Window::new(tr(lang, "notice"))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.set_max_width(420.0);
            ui.label(text);
            ui.add_space(10.0);
            ui.vertical_centered(|ui| {
                if ui.button("OK").clicked() {
                    s.alert = None;
                }
            });
        });
}
