//! System tray integration.
//!
//! - Tray icon coloured by sampler status
//! - Context menu mapping 1:1 to sampler and window operations
//! - Desktop notifications when the sensor is lost or found again

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use eframe::egui;
use tracing::{debug, info, warn};
use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder, TrayIconEvent};

use sps30_service::SamplerEvent;

use crate::icon::{IconStatus, TRAY_ICON_SIZE, render_rgba};

/// Global egui context for waking up the event loop.
/// Tray and worker events may arrive while the window is hidden and the
/// event loop is idle.
static EGUI_CTX: Mutex<Option<egui::Context>> = Mutex::new(None);

/// Tray icon events, queued by the handler installed in [`TrayManager::new`].
static TRAY_EVENTS: Mutex<Vec<TrayIconEvent>> = Mutex::new(Vec::new());

/// Menu events, queued likewise.
static MENU_EVENTS: Mutex<Vec<MenuEvent>> = Mutex::new(Vec::new());

/// Set the global egui context used by [`request_repaint`].
pub fn set_egui_context(ctx: egui::Context) {
    if let Ok(mut guard) = EGUI_CTX.lock() {
        *guard = Some(ctx);
    }
}

/// Wake the UI event loop. No-op until [`set_egui_context`] has been called.
pub fn request_repaint() {
    if let Ok(guard) = EGUI_CTX.lock()
        && let Some(ctx) = guard.as_ref()
    {
        ctx.request_repaint();
    }
}

/// Error type for tray operations.
#[derive(Debug, thiserror::Error)]
pub enum TrayError {
    #[error("Failed to build icon: {0}")]
    Icon(#[from] tray_icon::BadIcon),
    #[error("Tray icon error: {0}")]
    TrayIcon(#[from] tray_icon::Error),
    #[error("Menu error: {0}")]
    Menu(#[from] tray_icon::menu::Error),
}

/// Commands from the tray to the dashboard app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    /// Show and focus the dashboard.
    ShowWindow,
    /// Left click on the icon.
    ToggleWindow,
    /// Pause or resume sampling, depending on the current state.
    TogglePause,
    ConnectionTest,
    Quit,
}

/// Shared state between the tray and the app.
#[derive(Debug, Default)]
pub struct TrayState {
    /// Status line, e.g. the latest PM2.5 value.
    pub headline: String,
    pub icon: Option<IconStatus>,
    pub paused: bool,
}

impl TrayState {
    /// Tooltip text.
    pub fn tooltip(&self) -> String {
        if self.headline.is_empty() {
            "SPS30 Logger".to_string()
        } else {
            format!("SPS30 Logger\n{}", self.headline)
        }
    }

    /// Label of the pause/resume menu item.
    pub fn pause_label(&self) -> &'static str {
        if self.paused { "Resume" } else { "Pause" }
    }
}

/// Owns the tray icon and its menu.
pub struct TrayManager {
    tray_icon: TrayIcon,
    status_item: MenuItem,
    open_item: MenuItem,
    pause_item: MenuItem,
    test_item: MenuItem,
    quit_item: MenuItem,
    state: Arc<Mutex<TrayState>>,
    shown_icon: Cell<Option<IconStatus>>,
}

impl TrayManager {
    /// Create the tray icon. Must run on the main thread before the event loop.
    pub fn new(state: Arc<Mutex<TrayState>>) -> Result<Self, TrayError> {
        let (tooltip, pause_label) = state
            .lock()
            .map(|s| (s.tooltip(), s.pause_label()))
            .unwrap_or_else(|_| ("SPS30 Logger".to_string(), "Pause"));

        let status_item = MenuItem::new("Waiting for first reading", false, None);
        let open_item = MenuItem::new("Open dashboard", true, None);
        let pause_item = MenuItem::new(pause_label, true, None);
        let test_item = MenuItem::new("Connection test", true, None);
        let quit_item = MenuItem::new("Quit", true, None);

        let menu = Menu::new();
        menu.append_items(&[
            &status_item,
            &PredefinedMenuItem::separator(),
            &open_item,
            &pause_item,
            &test_item,
            &PredefinedMenuItem::separator(),
            &quit_item,
        ])?;

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(&tooltip)
            .with_icon(load_tray_icon(IconStatus::Disconnected)?)
            .with_menu_on_left_click(false)
            .build()?;

        // Handlers bypass the default receivers, so queue the events and
        // wake the event loop ourselves.
        TrayIconEvent::set_event_handler(Some(move |event| {
            debug!("TrayIconEvent received: {:?}", event);
            if let Ok(mut guard) = TRAY_EVENTS.lock() {
                guard.push(event);
            }
            request_repaint();
        }));

        MenuEvent::set_event_handler(Some(move |event| {
            debug!("MenuEvent received: {:?}", event);
            if let Ok(mut guard) = MENU_EVENTS.lock() {
                guard.push(event);
            }
            request_repaint();
        }));

        info!("System tray icon created");

        Ok(Self {
            tray_icon,
            status_item,
            open_item,
            pause_item,
            test_item,
            quit_item,
            state,
            shown_icon: Cell::new(Some(IconStatus::Disconnected)),
        })
    }

    /// Drain pending tray events into commands.
    pub fn process_events(&self) -> Vec<TrayCommand> {
        let mut commands = Vec::new();

        let menu_events = MENU_EVENTS
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();

        for event in menu_events {
            if event.id == self.open_item.id() {
                debug!("Tray: Open dashboard clicked");
                commands.push(TrayCommand::ShowWindow);
            } else if event.id == self.pause_item.id() {
                debug!("Tray: Pause/Resume clicked");
                commands.push(TrayCommand::TogglePause);
            } else if event.id == self.test_item.id() {
                debug!("Tray: Connection test clicked");
                commands.push(TrayCommand::ConnectionTest);
            } else if event.id == self.quit_item.id() {
                debug!("Tray: Quit clicked");
                commands.push(TrayCommand::Quit);
            }
        }

        let tray_events = TRAY_EVENTS
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();

        for event in tray_events {
            match event {
                // Only the button release, otherwise one click toggles twice.
                TrayIconEvent::Click {
                    button: tray_icon::MouseButton::Left,
                    button_state: tray_icon::MouseButtonState::Up,
                    ..
                } => commands.push(TrayCommand::ToggleWindow),
                TrayIconEvent::DoubleClick {
                    button: tray_icon::MouseButton::Left,
                    ..
                } => commands.push(TrayCommand::ShowWindow),
                _ => {}
            }
        }

        commands
    }

    /// Push the shared state to the tooltip, menu and icon.
    pub fn update(&self) {
        let Ok(state) = self.state.lock() else {
            return;
        };

        if let Err(e) = self.tray_icon.set_tooltip(Some(&state.tooltip())) {
            warn!("Failed to update tray tooltip: {}", e);
        }
        self.status_item.set_text(&state.headline);
        self.pause_item.set_text(state.pause_label());

        let Some(status) = state.icon else {
            return;
        };
        if self.shown_icon.get() == Some(status) {
            return;
        }
        match load_tray_icon(status) {
            Ok(icon) => {
                if let Err(e) = self.tray_icon.set_icon(Some(icon)) {
                    warn!("Failed to update tray icon: {}", e);
                } else {
                    self.shown_icon.set(Some(status));
                }
            }
            Err(e) => warn!("Failed to build tray icon: {}", e),
        }
    }
}

fn load_tray_icon(status: IconStatus) -> Result<Icon, TrayError> {
    Ok(Icon::from_rgba(
        render_rgba(status, TRAY_ICON_SIZE),
        TRAY_ICON_SIZE,
        TRAY_ICON_SIZE,
    )?)
}

/// A desktop notification to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: &'static str,
    pub body: String,
}

/// Decides when connection changes deserve a notification.
///
/// The first "not found" after start-up or after a working connection is
/// announced; repeats while still searching are not. Finding the sensor
/// again after a "not found" is announced too.
#[derive(Debug, Default)]
pub struct ConnectionAlerts {
    /// `None` until the first connection outcome is known.
    connected: Option<bool>,
}

impl ConnectionAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sampler event; returns the alert to show, if any.
    pub fn on_event(&mut self, event: &SamplerEvent) -> Option<Alert> {
        match event {
            SamplerEvent::NoPortFound { tried } => {
                let announce = self.connected != Some(false);
                self.connected = Some(false);
                announce.then(|| Alert {
                    title: "SPS30 not found",
                    body: if tried.is_empty() {
                        "No candidate serial ports. Retrying every sample period.".to_string()
                    } else {
                        format!(
                            "Tried {}. Retrying every sample period.",
                            tried.join(", ")
                        )
                    },
                })
            }
            SamplerEvent::Connected { port } => {
                let announce = self.connected == Some(false);
                self.connected = Some(true);
                announce.then(|| Alert {
                    title: "SPS30 connected",
                    body: format!("Logging from {port}."),
                })
            }
            SamplerEvent::Diagnostics(report) => Some(Alert {
                title: "Connection test",
                body: report.to_string(),
            }),
            _ => None,
        }
    }
}

/// Show a desktop notification.
pub fn send_notification(alert: &Alert) {
    use notify_rust::Notification;

    let mut notification = Notification::new();
    notification
        .summary(alert.title)
        .body(&alert.body)
        .appname("SPS30 Logger");

    match notification.show() {
        Ok(_) => debug!("Notification sent: {} - {}", alert.title, alert.body),
        Err(e) => warn!("Failed to send notification: {}", e),
    }
}
