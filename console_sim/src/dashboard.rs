use std::cell::Cell;
use std::io;
use std::io::Stdout;

use tui::backend::CrosstermBackend;
use tui::layout::{Alignment, Constraint, Direction, Layout};
use tui::style::{Color, Style};
use tui::text::{Span, Spans};
use tui::widgets::{Block, BorderType, Borders, Gauge, Paragraph};
use tui::Terminal;

use soc_control::bsp::report::ReportSink;
use soc_control::report::Report;

use crate::log_buffer;
use crate::sim_battery::SimBattery;

const LOG_LINES: usize = 8;

/// Screen of the meter. Remembers the last report until the next frame is drawn.
pub struct Dashboard {
    available: bool,
    last: Cell<Option<Report>>,
}

impl Dashboard {
    pub fn create(available: bool) -> Self {
        Dashboard {
            available,
            last: Cell::new(None),
        }
    }
}

impl ReportSink for Dashboard {
    fn is_available(&self) -> bool {
        self.available
    }

    fn report(&self, report: &Report) {
        self.last.set(Some(*report));
    }
}

pub fn draw_tui(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    dashboard: &Dashboard,
    battery: &SimBattery,
) -> io::Result<()> {
    let report = dashboard.last.get();
    let log_lines = log_buffer::recent(LOG_LINES);
    terminal.draw(|rect| {
        let size = rect.size();
        let vertical_layout = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints(
                [
                    Constraint::Length(3),
                    Constraint::Length(6),
                    Constraint::Length(5),
                    Constraint::Min(3),
                ]
                .as_ref(),
            )
            .split(size);

        let soc = report.map_or(0.0, |it| it.soc_percent);
        let gauge_color = if soc < 20.0 {
            Color::Red
        } else if soc < 50.0 {
            Color::Yellow
        } else {
            Color::Green
        };
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .title(" state of charge ")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            )
            .gauge_style(Style::default().fg(gauge_color))
            .ratio((soc as f64 / 100.0).max(0.0).min(1.0))
            .label(format!("{:.1} %", soc));

        let readings = match report {
            Some(report) => vec![
                Spans::from(Span::raw(format!("voltage:     {:.2} V", report.voltage))),
                Spans::from(Span::raw(format!("current:     {:.3} A", report.current))),
                Spans::from(Span::raw(match report.temperature_c {
                    Some(t) => format!("temperature: {:.1} C", t),
                    None => "temperature: --".to_string(),
                })),
                Spans::from(if report.stale {
                    Span::styled("sensor readings are stale", Style::default().fg(Color::Red))
                } else {
                    Span::raw("")
                }),
            ],
            None => vec![Spans::from(Span::raw("waiting for the first tick"))],
        };
        let readings_paragraph = Paragraph::new(readings)
            .alignment(Alignment::Left)
            .block(
                Block::default()
                    .title(" meter ")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            );

        let sim_paragraph = Paragraph::new(vec![
            Spans::from(Span::raw(format!(
                "load: {:.2} A   real charge: {:.1} %",
                battery.load(),
                battery.soc_percent()
            ))),
            Spans::from(Span::raw(
                "up/down: load +-0.5 A   0: no load   t: probe   c: recalibrate   esc: quit",
            )),
        ])
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .title(" simulation ")
                .borders(Borders::ALL)
                .border_type(BorderType::Plain),
        );

        let log_paragraph = Paragraph::new(
            log_lines
                .into_iter()
                .map(|line| Spans::from(Span::raw(line)))
                .collect::<Vec<_>>(),
        )
        .block(Block::default().title(" log ").borders(Borders::TOP));

        rect.render_widget(gauge, vertical_layout[0]);
        rect.render_widget(readings_paragraph, vertical_layout[1]);
        rect.render_widget(sim_paragraph, vertical_layout[2]);
        rect.render_widget(log_paragraph, vertical_layout[3]);
    })?;
    Ok(())
}
