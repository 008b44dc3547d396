use crate::core::error::Severity;
use crate::core::navigation::{Payload, Screen};
use crate::core::state::Snapshot;
use crate::remote::{ImageBlob, ImageFormat, Listing, MediaDetail, MediaItem, MediaKind};
use crate::tui::{MenuEntry, TuiState};

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub fn draw_ui(
    frame: &mut Frame,
    snap: &Snapshot,
    tui: &TuiState,
    poster: Option<&ImageBlob>,
    spinner_frame: usize,
) {
    use Constraint::{Length, Min};
    let layout = Layout::vertical([Length(1), Min(0), Length(1), Length(1)]);
    let [title_area, main_area, status_area, help_area] = layout.areas(frame.area());

    // Title bar
    let mut title = format!("Marquee | {}", snap.screen.title());
    if snap.loading.any() {
        title.push(' ');
        title.push_str(SPINNER[spinner_frame % SPINNER.len()]);
    }
    frame.render_widget(
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        title_area,
    );

    if snap.payload.is_loading() {
        draw_centered(frame, main_area, "Loading...");
    } else {
        match snap.screen {
            Screen::MainMenu => draw_menu(frame, main_area, tui.menu_index),
            Screen::Keyboard => draw_keyboard(frame, main_area, tui),
            Screen::SearchResults | Screen::Browse => match snap.payload.listing() {
                Some(listing) => draw_listing(frame, main_area, listing, tui.list_index),
                None => draw_centered(frame, main_area, "Nothing to show"),
            },
            Screen::MediaDetail => draw_detail(frame, main_area, &snap.payload, poster),
        }
    }

    // Status line: transient message, colored by severity
    if let Some(message) = &snap.message {
        frame.render_widget(
            Span::styled(message.text.as_str(), severity_style(message.severity)),
            status_area,
        );
    }

    frame.render_widget(
        Span::styled(help_text(snap.screen), Style::default().add_modifier(Modifier::DIM)),
        help_area,
    );
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::default().fg(Color::Cyan),
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn help_text(screen: Screen) -> &'static str {
    match screen {
        Screen::MainMenu => "↑/↓ move  Enter select  q quit",
        Screen::Keyboard => "type to search  Enter submit  Esc back",
        Screen::SearchResults | Screen::Browse => "↑/↓ move  Enter details  Esc back",
        Screen::MediaDetail => "Enter/r request  Esc back",
    }
}

fn draw_centered(frame: &mut Frame, area: Rect, text: &str) {
    let paragraph = Paragraph::new(text)
        .block(Block::bordered())
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn highlighted_list<'a>(items: Vec<ListItem<'a>>, title: &'a str) -> List<'a> {
    List::new(items)
        .block(Block::bordered().title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ")
}

fn draw_menu(frame: &mut Frame, area: Rect, selected: usize) {
    let items: Vec<ListItem> = MenuEntry::ALL
        .iter()
        .map(|entry| ListItem::new(entry.label()))
        .collect();
    let mut state = ListState::default().with_selected(Some(selected));
    frame.render_stateful_widget(highlighted_list(items, "Main Menu"), area, &mut state);
}

fn draw_keyboard(frame: &mut Frame, area: Rect, tui: &TuiState) {
    let prompt = format!("Search {}", tui.search_kind.label());
    let line = Line::from(vec![
        Span::raw(tui.query.as_str()),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ]);
    let paragraph = Paragraph::new(line).block(Block::bordered().title(prompt));
    frame.render_widget(paragraph, area);
}

fn listing_row(item: &MediaItem) -> ListItem<'_> {
    let mut spans = vec![Span::raw(item.display_title())];
    if let Some(rating) = item.rating {
        spans.push(Span::styled(
            format!("  ★ {rating:.1}"),
            Style::default().fg(Color::Yellow),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn draw_listing(frame: &mut Frame, area: Rect, listing: &Listing, selected: usize) {
    let items: Vec<ListItem> = listing.items.iter().map(listing_row).collect();
    let title = format!("Page {} of {}", listing.page, listing.total_pages.max(1));
    let mut state = ListState::default().with_selected(Some(selected));
    frame.render_stateful_widget(highlighted_list(items, &title), area, &mut state);
}

fn poster_line(poster: Option<&ImageBlob>, has_path: bool) -> String {
    match poster {
        Some(blob) => {
            let format = match blob.format {
                ImageFormat::Jpeg => "JPEG",
                ImageFormat::Png => "PNG",
                ImageFormat::Gif => "GIF",
                ImageFormat::Webp => "WebP",
            };
            format!("Poster: {} ({} KB)", format, blob.byte_size().div_ceil(1024))
        }
        None if has_path => "Poster: loading...".to_string(),
        None => "Poster: none".to_string(),
    }
}

/// Header lines for a detail screen. Summary-only payloads show what the
/// listing already knew while the full record loads.
fn detail_lines(item: &MediaItem, detail: Option<&MediaDetail>) -> Vec<String> {
    let mut lines = vec![item.display_title(), String::new()];
    let kind = match item.kind {
        MediaKind::Movie => "Movie",
        MediaKind::Tv => "TV Show",
    };
    let mut facts = vec![kind.to_string()];
    if let Some(rating) = item.rating {
        facts.push(format!("★ {rating:.1}"));
    }
    if let Some(detail) = detail {
        if let Some(minutes) = detail.runtime_minutes {
            facts.push(format!("{minutes} min"));
        }
        if !detail.genres.is_empty() {
            facts.push(detail.genres.join(", "));
        }
    }
    lines.push(facts.join(" · "));
    if let Some(availability) = detail.and_then(|d| d.availability) {
        lines.push(format!("Status: {}", availability.label()));
    }
    lines
}

fn draw_detail(frame: &mut Frame, area: Rect, payload: &Payload, poster: Option<&ImageBlob>) {
    let Some(item) = payload.media() else {
        draw_centered(frame, area, "No title selected");
        return;
    };

    let mut lines: Vec<Line> = detail_lines(item, payload.detail())
        .into_iter()
        .map(Line::from)
        .collect();
    lines.push(Line::from(poster_line(poster, item.poster_path.is_some())));
    lines.push(Line::from(""));

    // Wrap the overview ourselves so long words break the same way every frame
    let width = area.width.saturating_sub(2).max(10) as usize;
    match &item.overview {
        Some(overview) => {
            for wrapped in textwrap::wrap(overview, width) {
                lines.push(Line::from(wrapped.into_owned()));
            }
        }
        None if payload.detail().is_none() => lines.push(Line::from("Loading details...")),
        None => lines.push(Line::from("No overview available.")),
    }

    let paragraph = Paragraph::new(lines).block(Block::bordered().title("Details"));
    frame.render_widget(paragraph, area);
}
