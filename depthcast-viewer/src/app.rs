//! Viewer state, key handling and drawing.
//!
//! ```text
//! ┌ Kinect Server ─────────────┐┌ KinectPointCloud · Front view ─────────┐
//! │ [s] Start Kinect Server    ││                                        │
//! │ Drop points   1     [d/D]  ││          ⠠⠤⣀⡀  ⢀⣀⠤⠄                    │
//! │ X Scale      0.50   [x/X]  ││        ⠈⠉⠉⠉⠉⠉⠉⠉⠉⠉⠁                    │
//! │ …                          ││                                        │
//! ├ Logs [c] clear ────────────┤│                                        │
//! │ [12:00:01] Client connected││                                        │
//! └────────────────────────────┘└────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Block, List, ListItem, Padding, Paragraph, Widget,
        canvas::{Canvas, Points},
    },
};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use depthcast_core::{
    DepthServer, FrameReceiver, RateMeter, ReceivedCloud, ReceiverStats, ServerConfig,
    ServerEvent,
};

use crate::config::ViewerConfig;
use crate::scene::{Axis, DisplaySettings, OBJECT_NAME, SceneCloud, ViewMode};

/// Upper bound on points plotted per redraw; the scene itself keeps all.
const MAX_DRAWN_POINTS: usize = 40_000;

pub struct App {
    server: DepthServer,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    frames: FrameReceiver,
    stats: watch::Receiver<ReceiverStats>,

    latest: Option<Arc<ReceivedCloud>>,
    pub scene: SceneCloud,
    pub settings: DisplaySettings,
    pub view: ViewMode,
    fps: RateMeter,

    pub logs: VecDeque<String>,
    log_capacity: usize,
    export_dir: PathBuf,
    pub exit: bool,
}

impl App {
    pub fn new(config: &ViewerConfig) -> Self {
        let (server, events) = DepthServer::new(ServerConfig {
            endpoint: config.network.listen.clone(),
            projection: config.projection,
        });
        let frames = server.frame_receiver();
        let stats = server.stats_receiver();

        Self {
            server,
            events,
            frames,
            stats,
            latest: None,
            scene: SceneCloud::new(),
            settings: config.display_settings(),
            view: config.display.view,
            fps: RateMeter::new(),
            logs: VecDeque::new(),
            log_capacity: config.display.log_capacity.max(1),
            export_dir: config.display.export_dir.clone(),
            exit: false,
        }
    }

    pub fn is_server_running(&self) -> bool {
        self.server.is_running()
    }

    // ── Server control ───────────────────────────────────────────

    pub fn start_server(&mut self) {
        if self.server.is_running() {
            self.add_log("Start attempted but server already running.");
            return;
        }
        match self.server.start() {
            Ok(endpoint) => {
                info!("server started on {endpoint}");
                self.add_log("Kinect server started.");
            }
            Err(e) => {
                warn!("cannot start server: {e}");
                self.add_log(format!("Failed to start server: {e}"));
            }
        }
    }

    pub fn stop_server(&mut self) {
        match self.server.stop() {
            Ok(()) => {
                // Pick up the thread's final events before announcing.
                self.drain_events();
                self.add_log("Kinect server stopped.");
            }
            Err(_) => self.add_log("Stop attempted but server was not running."),
        }
    }

    /// The panel's single Start/Stop control.
    pub fn toggle_server(&mut self) {
        if self.server.is_running() {
            self.stop_server();
        } else {
            self.start_server();
        }
    }

    /// Stop the server if needed; called before exiting.
    pub fn shutdown(&mut self) {
        if self.server.is_running() {
            self.stop_server();
        }
    }

    // ── Logs ─────────────────────────────────────────────────────

    /// Append a timestamped line, dropping the oldest past capacity.
    pub fn add_log(&mut self, msg: impl AsRef<str>) {
        let entry = format!("[{}] {}", Local::now().format("%H:%M:%S"), msg.as_ref().trim());
        self.logs.push_back(entry);
        while self.logs.len() > self.log_capacity {
            self.logs.pop_front();
        }
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    // ── Per-tick update ──────────────────────────────────────────

    /// Pull server events and the newest frame, if any. Never blocks.
    pub fn tick(&mut self) {
        self.drain_events();

        if self.frames.has_changed().unwrap_or(false) {
            let latest = self.frames.borrow_and_update().clone();
            if let Some(received) = latest {
                self.scene.update(
                    &received.frame.cloud,
                    received.frame.frame_number,
                    &self.settings,
                );
                self.fps.record(received.wire_bytes as u64);
                self.latest = Some(received);
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.add_log(event.to_string());
        }
    }

    /// Reapply the panel settings to the last received cloud.
    fn refresh_scene(&mut self) {
        if let Some(latest) = &self.latest {
            self.scene.rebuild(&latest.frame.cloud, &self.settings);
        }
    }

    // ── Input ────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.exit = true,
            KeyCode::Char('q') | KeyCode::Esc => self.exit = true,
            KeyCode::Char('s') | KeyCode::Enter => self.toggle_server(),
            KeyCode::Char('c') => self.clear_logs(),
            KeyCode::Char('v') => self.view = self.view.toggle(),
            KeyCode::Char('e') => self.export_scene(),
            KeyCode::Char('d') => self.adjust(|s| s.adjust_drop_points(-1)),
            KeyCode::Char('D') => self.adjust(|s| s.adjust_drop_points(1)),
            KeyCode::Char('x') => self.adjust(|s| s.step_scale(Axis::X, false)),
            KeyCode::Char('X') => self.adjust(|s| s.step_scale(Axis::X, true)),
            KeyCode::Char('y') => self.adjust(|s| s.step_scale(Axis::Y, false)),
            KeyCode::Char('Y') => self.adjust(|s| s.step_scale(Axis::Y, true)),
            KeyCode::Char('z') => self.adjust(|s| s.step_scale(Axis::Z, false)),
            KeyCode::Char('Z') => self.adjust(|s| s.step_scale(Axis::Z, true)),
            _ => {}
        }
    }

    fn adjust(&mut self, f: impl FnOnce(&mut DisplaySettings)) {
        let before = self.settings;
        f(&mut self.settings);
        if self.settings != before {
            self.refresh_scene();
        }
    }

    /// Save the scene object as PLY in the export directory.
    pub fn export_scene(&mut self) {
        let Some(frame) = self.scene.frame_number() else {
            self.add_log("Nothing to export yet.");
            return;
        };
        let path = self.export_dir.join(format!("{OBJECT_NAME}-{frame:06}.ply"));
        match self.scene.save_ply(&path) {
            Ok(()) => self.add_log(format!(
                "Exported {} points to {}",
                self.scene.len(),
                path.display()
            )),
            Err(e) => self.add_log(format!("Export failed: {e}")),
        }
    }

    // ── Drawing ──────────────────────────────────────────────────

    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let buf = frame.buffer_mut();

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(36), Constraint::Min(0)])
            .split(area);

        let panel = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(12), Constraint::Min(3), Constraint::Length(1)])
            .split(columns[0]);

        self.render_controls(panel[0], buf);
        self.render_logs(panel[1], buf);
        Paragraph::new(Line::from(Span::styled(
            " v view · e export · q quit",
            Style::default().fg(Color::DarkGray),
        )))
        .render(panel[2], buf);

        self.render_viewport(columns[1], buf);
    }

    fn render_controls(&mut self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .title(Span::styled(
                " Kinect Server ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ))
            .border_style(Style::default().fg(Color::DarkGray))
            .padding(Padding::horizontal(1));
        let inner = block.inner(area);
        block.render(area, buf);

        let running = self.server.is_running();
        let (label, label_style) = if running {
            ("Stop Kinect Server", Style::default().fg(Color::Black).bg(Color::Yellow))
        } else {
            ("Start Kinect Server", Style::default().fg(Color::Black).bg(Color::Green))
        };
        let stats = *self.stats.borrow();
        let [sx, sy, sz] = self.settings.scale();
        let key = Style::default().fg(Color::DarkGray);
        let name = Style::default().fg(Color::Gray);
        let value = Style::default().fg(Color::Yellow);

        let setting = |title: &'static str, val: String, keys: &'static str| {
            Line::from(vec![
                Span::styled(format!("{title:<13}"), name),
                Span::styled(format!("{val:>5}"), value),
                Span::styled(format!("   [{keys}]"), key),
            ])
        };

        let endpoint = match self.server.local_endpoint() {
            Some(ep) => Span::styled(ep.to_string(), Style::default().fg(Color::Green)),
            None => Span::styled("stopped", Style::default().fg(Color::DarkGray)),
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("[s] ", key),
                Span::styled(label, label_style.add_modifier(Modifier::BOLD)),
            ]),
            Line::from(""),
            setting("Drop points", self.settings.drop_points().to_string(), "d/D"),
            setting("X Scale", format!("{sx:.2}"), "x/X"),
            setting("Y Scale", format!("{sy:.2}"), "y/Y"),
            setting("Z Scale", format!("{sz:.2}"), "z/Z"),
            Line::from(""),
            Line::from(vec![
                Span::styled("FPS: ", name),
                Span::styled(format!("{:.1}", self.fps.fps()), value),
                Span::styled("  Points: ", name),
                Span::styled(self.scene.len().to_string(), value),
            ]),
            Line::from(vec![
                Span::styled("Frames: ", name),
                Span::styled(stats.frames.to_string(), value),
                Span::styled("  ", name),
                endpoint,
            ]),
        ];
        Paragraph::new(lines).render(inner, buf);
    }

    fn render_logs(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .title(Line::from(vec![
                Span::styled(
                    " Logs ",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled("[c] clear ", Style::default().fg(Color::DarkGray)),
            ]))
            .border_style(Style::default().fg(Color::DarkGray));
        let inner = block.inner(area);
        block.render(area, buf);

        // Newest at the bottom, like an auto-scrolled list.
        let visible = inner.height as usize;
        let skip = self.logs.len().saturating_sub(visible);
        let last = self.logs.len().saturating_sub(1);
        let items: Vec<ListItem> = self
            .logs
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, log)| {
                let style = if i == last {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::Gray)
                };
                ListItem::new(Line::from(Span::styled(log.as_str(), style)))
            })
            .collect();
        List::new(items).render(inner, buf);
    }

    fn render_viewport(&self, area: Rect, buf: &mut Buffer) {
        let title = Line::from(vec![
            Span::styled(
                format!(" {OBJECT_NAME} "),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("· {} view ", self.view.label()),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        let block = Block::bordered()
            .title(title)
            .border_style(Style::default().fg(Color::DarkGray));

        let view = self.view;
        let stride = self.scene.len() / MAX_DRAWN_POINTS + 1;
        let coords: Vec<(f64, f64)> = self
            .scene
            .points()
            .iter()
            .step_by(stride)
            .map(|&p| view.project(p))
            .collect();
        let (x_bounds, y_bounds) = self
            .scene
            .view_bounds(view)
            .map(|(xs, ys)| (padded(xs), padded(ys)))
            .unwrap_or(([-1.0, 1.0], [-1.0, 1.0]));

        Canvas::default()
            .block(block)
            .marker(Marker::Braille)
            .x_bounds(x_bounds)
            .y_bounds(y_bounds)
            .paint(|ctx| {
                ctx.draw(&Points {
                    coords: &coords,
                    color: Color::Cyan,
                });
            })
            .render(area, buf);
    }
}

/// Widen `[lo, hi]` by 5% each side, and to a unit span if degenerate.
fn padded([lo, hi]: [f64; 2]) -> [f64; 2] {
    let span = hi - lo;
    if span <= f64::EPSILON {
        return [lo - 0.5, hi + 0.5];
    }
    [lo - span * 0.05, hi + span * 0.05]
}

// ── Tests ────────────────────────────────────────────────────────
