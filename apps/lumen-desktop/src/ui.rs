use egui::{Color32, Ui};
use lumen_input::Action;
use lumen_panel::{FloatField, ListView, Mounted, Panel, VectorField};
use lumen_state::Node;
use std::rc::Rc;

const FIELD_WIDTH: f32 = 64.0;
const INVALID: Color32 = Color32::from_rgb(230, 80, 80);

/// Scroll delta over the hovered widget, in the browser's wheel convention
/// (positive scrolls down).
fn wheel_delta(ui: &Ui, response: &egui::Response) -> f64 {
    if !response.hovered() {
        return 0.0;
    }
    -f64::from(ui.input(|i| i.raw_scroll_delta.y))
}

fn number_box(ui: &mut Ui, enabled: bool, field: &FloatField) -> (egui::Response, String) {
    let mut text = field.text();
    let mut edit = egui::TextEdit::singleline(&mut text).desired_width(FIELD_WIDTH);
    if field.is_pending() {
        edit = edit.text_color(INVALID);
    }
    let response = ui.add_enabled(enabled, edit);
    (response, text)
}

fn float(ui: &mut Ui, field: &Rc<FloatField>) {
    ui.horizontal(|ui| {
        ui.label(field.header());
        let (response, text) = number_box(ui, true, field);
        if response.changed() {
            field.edit(&text);
        }
        let delta = wheel_delta(ui, &response);
        if delta != 0.0 {
            field.wheel(delta);
        }
    });
}

fn vector(ui: &mut Ui, field: &Rc<VectorField>) {
    ui.label(field.header());
    ui.horizontal(|ui| {
        for (i, component) in field.components().iter().enumerate() {
            let (response, text) = number_box(ui, field.enabled(i), component);
            if response.changed() {
                field.edit(i, &text);
            }
            let delta = wheel_delta(ui, &response);
            if delta != 0.0 {
                field.wheel(i, delta);
            }
        }
    });
}

fn list(ui: &mut Ui, view: &ListView, salt: &str, actions: &mut Vec<Action>) {
    let list = view.list();
    egui::CollapsingHeader::new(view.header())
        .id_salt(salt)
        .default_open(true)
        .show(ui, |ui| {
            let mut remove = None;
            for (i, element) in list.elements().iter().enumerate() {
                ui.group(|ui| {
                    ui.horizontal(|ui| {
                        ui.strong(format!("#{}", i + 1));
                        if ui
                            .add_enabled(list.can_decrement(), egui::Button::new("Remove"))
                            .clicked()
                        {
                            remove = Some(i);
                        }
                    });
                    controls(ui, element.value(), &format!("{salt}/{i}"), actions);
                });
            }
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(list.can_increment(), egui::Button::new("+"))
                    .clicked()
                {
                    list.increment();
                }
                if ui
                    .add_enabled(list.can_decrement(), egui::Button::new("-"))
                    .clicked()
                {
                    list.decrement();
                }
            });
            if let Some(index) = remove {
                list.remove(index);
            }
        });
}

/// Draw `mounted` and collect the actions of any pressed buttons.
fn controls(ui: &mut Ui, mounted: &[Mounted], salt: &str, actions: &mut Vec<Action>) {
    for (n, control) in mounted.iter().enumerate() {
        let salt = format!("{salt}/{n}");
        match control {
            Mounted::Float(field) => float(ui, field),
            Mounted::Vector(field) => vector(ui, field),
            Mounted::Bool(field) => {
                let mut value = field.value();
                if ui.checkbox(&mut value, field.header()).changed() {
                    field.toggle();
                }
            }
            Mounted::Dropdown(field) => {
                let current = field.value();
                ui.horizontal(|ui| {
                    ui.label(field.header());
                    egui::ComboBox::from_id_salt(&salt)
                        .selected_text(current.as_str())
                        .show_ui(ui, |ui| {
                            for option in field.options() {
                                let selected = *option == current;
                                if ui.selectable_label(selected, option.as_str()).clicked() {
                                    field.select(option);
                                }
                            }
                        });
                });
            }
            Mounted::Section(view) => {
                egui::CollapsingHeader::new(view.header())
                    .id_salt(&salt)
                    .default_open(true)
                    .show(ui, |ui| controls(ui, view.children(), &salt, actions));
            }
            Mounted::List(view) => list(ui, view, &salt, actions),
            Mounted::Label(text) => {
                ui.label(text.as_str());
            }
            Mounted::Buttons { header, buttons } => {
                ui.label(header.resolve(&Node::Null));
                ui.horizontal_wrapped(|ui| {
                    for (label, action) in buttons {
                        if ui.button(label.as_str()).clicked() {
                            actions.push(action.clone());
                        }
                    }
                });
            }
        }
    }
}

/// Side panel with every control of `panel`. Returns the actions to apply
/// once the frame is done.
pub fn draw_panel(ctx: &egui::Context, panel: &Panel, status: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    egui::SidePanel::left("settings")
        .default_width(300.0)
        .show(ctx, |ui| {
            ui.heading("Settings");
            ui.small(status);
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                controls(ui, panel.controls(), "panel", &mut actions);
            });
            ui.separator();
            ui.small("F1: Toggle Panel | LMB drag: Orbit | Wheel: Zoom");
        });
    actions
}
