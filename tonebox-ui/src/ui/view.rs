use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
    Frame,
};

use tonebox_core::midi::MidiStatus;
use tonebox_core::PerformanceStatus;
use tonebox_types::{InstrumentKind, NoteSource, RecordingMode};

use super::app::App;
use super::keys::{pad_note, PAD_KEYS};

const HELP: &str = "1-4 instrument  a-k play  [ ] vol  - = tone  ; ' fx  m mode  r rec  \
                    ↑↓ take  p play  l loop  x del  i midi  n next input  u retry  q quit";

pub fn render(frame: &mut Frame, app: &App) {
    let [header, controls, pads, lists, status, help] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(5),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(frame, header, app);
    render_controls(frame, controls, app);
    render_pads(frame, pads, app);

    let [midi, takes] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(lists);
    render_midi(frame, midi, app);
    render_takes(frame, takes, app);

    render_status(frame, status, app);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        help,
    );
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.perf.state();
    let mut spans = Vec::new();
    for (i, kind) in InstrumentKind::ALL.into_iter().enumerate() {
        let style = if kind == state.selected_instrument() {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        spans.push(Span::styled(format!(" {} {} ", i + 1, kind.label()), style));
        spans.push(Span::raw(" "));
    }

    let mode = match state.recording_mode() {
        RecordingMode::Instrument => "rec: instrument",
        RecordingMode::Voice => "rec: voice",
    };
    spans.push(Span::raw("  "));
    spans.push(Span::styled(mode, Style::default().fg(Color::Yellow)));
    if state.is_recording() {
        spans.push(Span::styled(
            "  ● REC",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("tonebox")),
        area,
    );
}

fn render_controls(frame: &mut Frame, area: Rect, app: &App) {
    let controls = app.perf.state().controls();
    let params = app.perf.router().last_params();
    let columns = Layout::horizontal([Constraint::Ratio(1, 3); 3]).split(area);

    let gauges = [
        ("Volume", controls.volume, format!("{:.0}%", controls.volume * 100.0)),
        ("Tone", controls.tone, format!("{:.0} Hz", params.cutoff_hz)),
        ("Effect", controls.effect, format!("{:.0}% wet", params.wet * 100.0)),
    ];
    for ((title, value, label), column) in gauges.into_iter().zip(columns.iter()) {
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(value.clamp(0.0, 1.0) as f64)
            .label(label);
        frame.render_widget(gauge, *column);
    }
}

fn render_pads(frame: &mut Frame, area: Rect, app: &App) {
    let instrument = app.perf.state().selected_instrument();
    let drum_notes = app.perf.dispatcher().drum_map(NoteSource::Ui).notes();
    let drums = app.perf.dispatcher().drum_map(NoteSource::Ui);

    let spans: Vec<Span> = PAD_KEYS
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let text = match pad_note(i, instrument, &drum_notes) {
                Some(note) if instrument.is_drums() => match drums.get(note) {
                    Some(hit) => format!(" {}:{} ", key, hit.voice.name()),
                    None => format!(" {}:- ", key),
                },
                Some(note) => format!(" {}:{} ", key, note),
                None => format!(" {}:- ", key),
            };
            Span::raw(text)
        })
        .collect();

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("Pads")),
        area,
    );
}

fn render_midi(frame: &mut Frame, area: Rect, app: &App) {
    let midi = app.perf.midi();
    let title = match midi.status() {
        MidiStatus::Uninitialized => "MIDI (off, i to enable)".to_string(),
        MidiStatus::Enabling => "MIDI (enabling)".to_string(),
        MidiStatus::Enabled => format!("MIDI ({} inputs)", midi.inputs().len()),
        MidiStatus::Failed(_) => "MIDI (unavailable)".to_string(),
    };

    let items: Vec<ListItem> = midi
        .inputs()
        .iter()
        .map(|info| {
            let bound = midi.selected() == Some(&info.id);
            let marker = if bound { "▶ " } else { "  " };
            let style = if bound {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{}", marker, info.id)).style(style)
        })
        .collect();

    frame.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn render_takes(frame: &mut Frame, area: Rect, app: &App) {
    let takes = app.perf.takes();
    let items: Vec<ListItem> = takes
        .iter()
        .map(|take| {
            let looping = if take.is_looping { " ⟳" } else { "" };
            ListItem::new(format!(
                "Take {}  {:.1}s{}",
                take.id,
                take.resource.duration_secs(),
                looping
            ))
        })
        .collect();

    let mut state = ListState::default();
    if !takes.is_empty() {
        state.select(Some(app.selected_take));
    }
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!("Takes ({})", takes.len())))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let status = app.perf.status();
    let color = match &status {
        PerformanceStatus::Error(_) => Color::Red,
        PerformanceStatus::Recording(_) => Color::Yellow,
        PerformanceStatus::Armed => Color::Green,
        _ => Color::White,
    };
    frame.render_widget(
        Paragraph::new(status.to_string()).style(Style::default().fg(color)),
        area,
    );
}
