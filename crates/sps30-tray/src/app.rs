//! The dashboard window.
//!
//! [`DashboardApp`] drains sampler events, keeps the tray in sync and renders
//! the selected history window. Closing the window hides it to the tray.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;
use eframe::egui::{self, Color32, RichText, ViewportCommand};
use egui_plot::{Legend, Line, Plot, PlotPoints};
use tracing::{debug, info};

use sps30_core::ProbeReport;
use sps30_service::{Command, SamplerEvent, SamplerState, SamplerStatus};
use sps30_store::HistoryStore;
use sps30_types::{Channel, TimeWindow};

use crate::dashboard::{DashboardView, format_value};
use crate::icon::IconStatus;
use crate::tray::{self, ConnectionAlerts, TrayCommand, TrayManager, TrayState};
use crate::worker::SamplerWorker;

const GOOD: Color32 = Color32::from_rgb(46, 160, 67);
const BAD: Color32 = Color32::from_rgb(218, 54, 51);
const WARNING: Color32 = Color32::from_rgb(210, 153, 34);

/// Line colour per channel.
fn channel_color(channel: Channel) -> Color32 {
    match channel {
        Channel::Pm1 => Color32::from_rgb(88, 166, 255),
        Channel::Pm2_5 => Color32::from_rgb(46, 160, 67),
        Channel::Pm4 => Color32::from_rgb(210, 153, 34),
        Channel::Pm10 => Color32::from_rgb(218, 54, 51),
    }
}

/// Main application state.
pub struct DashboardApp {
    worker: SamplerWorker,
    history: Arc<HistoryStore>,
    status: SamplerStatus,
    view: DashboardView,
    alerts: ConnectionAlerts,
    last_report: Option<ProbeReport>,
    tray_state: Arc<Mutex<TrayState>>,
    tray_manager: Option<TrayManager>,
    /// Whether the window is visible; no queries run while hidden.
    window_visible: bool,
    /// Hide to tray instead of quitting when the window is closed.
    close_to_tray: bool,
    /// Set by the tray's Quit so the close is not intercepted.
    quitting: bool,
}

impl DashboardApp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        worker: SamplerWorker,
        history: Arc<HistoryStore>,
        refresh_interval: Duration,
        start_paused: bool,
        start_visible: bool,
        tray_state: Arc<Mutex<TrayState>>,
        tray_manager: Option<TrayManager>,
    ) -> Self {
        tray::set_egui_context(cc.egui_ctx.clone());

        // Without a tray the window is the only way back in.
        let close_to_tray = tray_manager.is_some();
        let window_visible = start_visible || !close_to_tray;
        if !window_visible {
            cc.egui_ctx.send_viewport_cmd(ViewportCommand::Visible(false));
        }

        let mut status = SamplerStatus::new(start_paused);
        status.last_reading = history.latest();

        let app = Self {
            worker,
            history,
            status,
            view: DashboardView::new(refresh_interval),
            alerts: ConnectionAlerts::new(),
            last_report: None,
            tray_state,
            tray_manager,
            window_visible,
            close_to_tray,
            quitting: false,
        };
        app.update_tray_state();
        app
    }

    /// Fold pending worker events into the status.
    fn process_events(&mut self) {
        let events = self.worker.drain();
        if events.is_empty() {
            return;
        }
        for event in &events {
            self.status.apply(event);
            if let Some(alert) = self.alerts.on_event(event) {
                tray::send_notification(&alert);
            }
            if let SamplerEvent::Diagnostics(report) = event {
                self.last_report = Some(report.clone());
            }
        }
        self.update_tray_state();
    }

    fn icon_status(&self) -> IconStatus {
        if self.status.state == SamplerState::Paused {
            IconStatus::Paused
        } else if self.status.is_connected(Local::now().naive_local()) {
            IconStatus::Connected
        } else {
            IconStatus::Disconnected
        }
    }

    fn update_tray_state(&self) {
        if let Ok(mut state) = self.tray_state.lock() {
            state.headline = self.status.headline();
            state.paused = self.status.state == SamplerState::Paused;
            state.icon = Some(self.icon_status());
        }
        if let Some(tray_manager) = &self.tray_manager {
            tray_manager.update();
        }
    }

    fn process_tray_events(&mut self, ctx: &egui::Context) {
        let Some(tray_manager) = &self.tray_manager else {
            return;
        };

        for command in tray_manager.process_events() {
            debug!("Tray command: {:?}", command);
            match command {
                TrayCommand::ShowWindow => self.set_visible(ctx, true),
                TrayCommand::ToggleWindow => self.set_visible(ctx, !self.window_visible),
                TrayCommand::TogglePause => {
                    if self.status.state == SamplerState::Paused {
                        self.worker.send(Command::Resume);
                    } else {
                        self.worker.send(Command::Pause);
                    }
                }
                TrayCommand::ConnectionTest => self.worker.send(Command::ConnectionTest),
                TrayCommand::Quit => {
                    info!("Quit requested from tray");
                    self.quitting = true;
                    ctx.send_viewport_cmd(ViewportCommand::Close);
                }
            }
        }
    }

    fn set_visible(&mut self, ctx: &egui::Context, visible: bool) {
        self.window_visible = visible;
        ctx.send_viewport_cmd(ViewportCommand::Visible(visible));
        if visible {
            ctx.send_viewport_cmd(ViewportCommand::Focus);
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        self.view.refresh(
            &self.history,
            Local::now().naive_local(),
            Instant::now(),
        );
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_events();
        self.process_tray_events(ctx);

        let close_requested = ctx.input(|i| i.viewport().close_requested());
        if close_requested && self.close_to_tray && !self.quitting {
            ctx.send_viewport_cmd(ViewportCommand::CancelClose);
            self.set_visible(ctx, false);
            debug!("Window close intercepted - hiding to tray");
        }

        if !self.window_visible {
            // Woken by tray and worker events only.
            return;
        }

        if self.view.needs_refresh(Instant::now()) {
            self.refresh();
            // The connection indicator ages even without new events.
            self.update_tray_state();
        }

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            self.render_header(ui);
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.render_window_selector(ui) {
                self.refresh();
            }
            ui.separator();

            if self.view.readings().is_empty() {
                ui.vertical_centered(|ui| {
                    ui.add_space(40.0);
                    ui.label(RichText::new("No data").size(20.0).strong());
                    ui.label(
                        RichText::new(format!(
                            "No readings in the selected window ({}).",
                            self.view.window().label()
                        ))
                        .weak(),
                    );
                });
            } else {
                self.render_summary(ui);
                ui.add_space(8.0);
                self.render_plot(ui);
            }

            if let Some(report) = &self.last_report {
                ui.add_space(8.0);
                egui::CollapsingHeader::new("Last connection test")
                    .default_open(true)
                    .show(ui, |ui| render_report(ui, report));
            }
        });

        ctx.request_repaint_after(self.view.refresh_interval());
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Shutting down sampler");
        self.worker.shutdown();
    }
}

impl DashboardApp {
    fn render_header(&self, ui: &mut egui::Ui) {
        let now = Local::now().naive_local();
        ui.horizontal(|ui| {
            if self.status.is_connected(now) {
                let port = self.status.port.as_deref().unwrap_or("?");
                ui.label(RichText::new("●").color(GOOD));
                ui.label(format!("Connected ({port})"));
            } else {
                ui.label(RichText::new("●").color(BAD));
                ui.label("Disconnected");
            }
            ui.separator();

            let pm2_5 = self.status.last_reading.map(|r| r.pm2_5);
            ui.label(
                RichText::new(format!("PM2.5 {} µg/m³", format_value(pm2_5)))
                    .strong()
                    .size(16.0),
            );
            ui.separator();

            let color = match self.status.state {
                SamplerState::Running => GOOD,
                SamplerState::Paused => ui.visuals().weak_text_color(),
                SamplerState::Reacquiring => WARNING,
            };
            ui.label(RichText::new(self.status.state.label()).color(color));
        });

        if let Some(problem) = &self.status.last_problem {
            ui.label(RichText::new(problem).color(WARNING));
        }
    }

    /// Returns whether the selected window changed.
    fn render_window_selector(&mut self, ui: &mut egui::Ui) -> bool {
        let mut selected = self.view.window();
        ui.horizontal(|ui| {
            ui.label("Window:");
            for window in TimeWindow::ALL {
                ui.selectable_value(&mut selected, window, window.label());
            }
        });
        self.view.set_window(selected)
    }

    fn render_summary(&self, ui: &mut egui::Ui) {
        let Some(summary) = self.view.summary() else {
            return;
        };

        ui.label(
            RichText::new(format!("{} readings (µg/m³)", summary.count)).weak(),
        );
        egui::Grid::new("summary")
            .striped(true)
            .num_columns(4)
            .min_col_width(90.0)
            .show(ui, |ui| {
                ui.label(RichText::new("Channel").strong());
                ui.label(RichText::new("Current").strong());
                ui.label(RichText::new("Average").strong());
                ui.label(RichText::new("Max").strong());
                ui.end_row();

                for stats in &summary.channels {
                    ui.label(RichText::new(stats.channel.label()).color(channel_color(stats.channel)));
                    ui.monospace(format_value(stats.current));
                    ui.monospace(format_value(stats.average));
                    ui.monospace(format_value(stats.max));
                    ui.end_row();
                }
            });
    }

    fn render_plot(&self, ui: &mut egui::Ui) {
        let span = self.view.span_hours();

        Plot::new(format!("history_{:?}", self.view.window()))
            .height(ui.available_height().max(180.0))
            .show_axes(true)
            .show_grid(true)
            .allow_scroll(false)
            .allow_drag([true, false])
            .allow_zoom([true, false])
            .allow_boxed_zoom(true)
            .allow_double_click_reset(true)
            .default_x_bounds(-span, 0.0)
            .auto_bounds([false, true])
            .include_x(0.0)
            .include_y(0.0)
            .x_axis_label("Hours ago")
            .y_axis_label("µg/m³")
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for channel in Channel::ALL {
                    let points = PlotPoints::new(self.view.points(channel));
                    plot_ui.line(
                        Line::new(channel.label(), points)
                            .color(channel_color(channel))
                            .width(1.5),
                    );
                }
            });
    }
}

fn render_report(ui: &mut egui::Ui, report: &ProbeReport) {
    if report.is_empty() {
        ui.label("No candidate ports.");
        return;
    }
    for probe in &report.ports {
        match &probe.outcome {
            Ok(reading) => {
                let device = probe
                    .device
                    .as_deref()
                    .map(|d| format!(", serial {d}"))
                    .unwrap_or_default();
                ui.label(
                    RichText::new(format!(
                        "{}: OK (PM2.5 {}{})",
                        probe.port,
                        format_value(Some(reading.pm2_5)),
                        device
                    ))
                    .color(GOOD),
                );
            }
            Err(reason) => {
                ui.label(RichText::new(format!("{}: {}", probe.port, reason)).color(BAD));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_colors_distinct() {
        let colors: Vec<Color32> = Channel::ALL.iter().map(|c| channel_color(*c)).collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
