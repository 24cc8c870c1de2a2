use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use taha_tui::backend::bookmarks::{Bookmark, BookmarkStore};
use taha_tui::backend::model::{
    ContentUnit, Page, SectionSummary, TOTAL_PAGES, UnitId, filter_sections,
};
use taha_tui::backend::playback::{PlaybackSnapshot, PlaybackStatus};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Loading,
    Ready,
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Bookmarks,
    Sections,
    Tafsir,
}

pub struct App {
    pub state: AppState,
    pub loading_message: String,
    pub page: Option<Page>,
    pub selected: usize,
    pub snapshot: Option<PlaybackSnapshot>,
    pub bookmarks: BookmarkStore,
    pub overlay: Overlay,
    pub bookmark_list_state: ListState,
    pub sections: Vec<SectionSummary>,
    pub section_query: String,
    pub section_list_state: ListState,
    pub tafsir: Option<(UnitId, Option<String>)>,
    pub message: Option<String>,
}

impl App {
    pub fn new(bookmarks: BookmarkStore) -> Self {
        Self {
            state: AppState::Loading,
            loading_message: "Initializing...".to_string(),
            page: None,
            selected: 0,
            snapshot: None,
            bookmarks,
            overlay: Overlay::None,
            bookmark_list_state: ListState::default(),
            sections: Vec::new(),
            section_query: String::new(),
            section_list_state: ListState::default(),
            tafsir: None,
            message: None,
        }
    }

    pub fn set_loading(&mut self, message: &str) {
        self.state = AppState::Loading;
        self.loading_message = message.to_string();
    }

    pub fn set_ready(&mut self) {
        self.state = AppState::Ready;
    }

    /// Shows `page` with the cursor on `focus` when it is on the page.
    pub fn set_page(&mut self, page: Page, focus: Option<UnitId>) {
        self.selected = focus.and_then(|id| page.position(id)).unwrap_or(0);
        self.page = Some(page);
        self.set_ready();
    }

    pub fn selected_unit(&self) -> Option<&ContentUnit> {
        self.page.as_ref().and_then(|p| p.units.get(self.selected))
    }

    pub fn move_selection(&mut self, delta: isize) {
        let Some(page) = self.page.as_ref() else {
            return;
        };
        let max = page.units.len().saturating_sub(1) as isize;
        self.selected = (self.selected as isize + delta).clamp(0, max) as usize;
    }

    /// Moves the cursor along with playback.
    pub fn follow_playback(&mut self, snapshot: PlaybackSnapshot) {
        if let (Some(page), Some(current)) = (self.page.as_ref(), snapshot.current) {
            if let Some(index) = page.position(current) {
                self.selected = index;
            }
        }
        self.snapshot = Some(snapshot);
    }

    pub fn filtered_sections(&self) -> Vec<&SectionSummary> {
        filter_sections(&self.sections, &self.section_query)
    }

    pub fn open_overlay(&mut self, overlay: Overlay) {
        self.overlay = overlay;
        match overlay {
            Overlay::Bookmarks => self.bookmark_list_state.select(Some(0)),
            Overlay::Sections => {
                self.section_query.clear();
                self.section_list_state.select(Some(0));
            }
            _ => {}
        }
    }

    pub fn close_overlay(&mut self) {
        self.overlay = Overlay::None;
    }

    pub fn selected_bookmark(&self) -> Option<Bookmark> {
        let index = self.bookmark_list_state.selected()?;
        self.bookmarks.list().into_iter().nth(index)
    }

    pub fn selected_section(&self) -> Option<u32> {
        let index = self.section_list_state.selected()?;
        self.filtered_sections().get(index).map(|s| s.id)
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    match app.state {
        AppState::Loading => draw_loading_screen(f, app),
        AppState::Ready => draw_reader(f, app),
    }
}

fn draw_loading_screen(f: &mut Frame, app: &App) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Taha")
        .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let center_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Percentage(40),
        ])
        .split(inner);

    let spinner_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let frame_idx = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        / 100) as usize
        % spinner_frames.len();

    let loading_text = Line::from(vec![
        Span::styled(
            format!(" {} ", spinner_frames[frame_idx]),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "Loading...",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ]);
    f.render_widget(
        Paragraph::new(loading_text).alignment(Alignment::Center),
        center_layout[1],
    );

    let message = Paragraph::new(&*app.loading_message)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(message, center_layout[2]);
}

fn draw_reader(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // page header
            Constraint::Min(5),    // page text
            Constraint::Length(3), // player
            Constraint::Length(1), // key hints
        ])
        .split(area);

    draw_header(f, root[0], app);
    draw_page(f, root[1], app);
    draw_player(f, root[2], app);
    draw_footer(f, root[3]);

    match app.overlay {
        Overlay::None => {}
        Overlay::Bookmarks => draw_bookmarks(f, area, app),
        Overlay::Sections => draw_sections(f, area, app),
        Overlay::Tafsir => draw_tafsir(f, area, app),
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let (sections, juz, number) = match app.page.as_ref() {
        Some(page) => {
            let mut names: Vec<&str> = Vec::new();
            for unit in &page.units {
                if names.last() != Some(&unit.section.english_name.as_str()) {
                    names.push(&unit.section.english_name);
                }
            }
            let juz = page.first().map(|u| u.juz).unwrap_or_default();
            (names.join(" · "), juz, page.number)
        }
        None => (String::new(), 0, 0),
    };

    let line = Line::from(vec![
        Span::styled(
            sections,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format!("Juz {} • Page {} / {}", juz, number, TOTAL_PAGES),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(line)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Taha")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn draw_page(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(page) = app.page.as_ref() else {
        let empty = Paragraph::new("No page loaded")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    };

    let playing = app.snapshot.as_ref().and_then(|s| s.current);
    let mut lines: Vec<Line> = Vec::new();
    let mut selected_line = 0usize;

    for (i, unit) in page.units.iter().enumerate() {
        if page.starts_section(i) {
            if !lines.is_empty() {
                lines.push(Line::from(""));
            }
            lines.push(
                Line::from(Span::styled(
                    format!("﴾ {} ﴿", unit.section.name),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))
                .alignment(Alignment::Center),
            );
        }

        let mut style = Style::default().fg(Color::White);
        if Some(unit.id) == playing {
            style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
        }
        if i == app.selected {
            style = style.add_modifier(Modifier::REVERSED);
            selected_line = lines.len();
        }

        let mut spans = Vec::new();
        if app.bookmarks.has(unit.id) {
            spans.push(Span::styled("★ ", Style::default().fg(Color::Magenta)));
        }
        spans.push(Span::styled(unit.text.clone(), style));
        spans.push(Span::styled(
            format!(" ۝{}", unit.ordinal),
            Style::default().fg(Color::Yellow),
        ));
        lines.push(Line::from(spans).alignment(Alignment::Right));
    }

    // keep the cursor roughly in view on long pages
    let scroll = selected_line.saturating_sub(inner.height as usize / 2) as u16;
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .scroll((scroll, 0));
    f.render_widget(paragraph, inner);
}

fn draw_player(f: &mut Frame, area: Rect, app: &App) {
    let (icon, label, narrator) = match app.snapshot.as_ref() {
        Some(snapshot) => {
            let icon = match snapshot.status {
                PlaybackStatus::Playing => "⏸",
                PlaybackStatus::Loading => "…",
                _ => "▶",
            };
            let ordinal = snapshot.current.and_then(|id| {
                app.page
                    .as_ref()
                    .and_then(|p| p.unit(id))
                    .map(|u| format!("Ayah {} of {}", u.ordinal, u.section.english_name))
            });
            let label = match snapshot.status {
                PlaybackStatus::Ended => "Finished".to_string(),
                PlaybackStatus::Loading => ordinal.map_or("Loading...".to_string(), |o| format!("{} (loading)", o)),
                _ => ordinal.unwrap_or_else(|| "Listen".to_string()),
            };
            (icon, label, snapshot.narrator.display_name())
        }
        None => ("▶", "Listen".to_string(), ""),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", icon),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::styled(label, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(narrator, Style::default().fg(Color::DarkGray)),
    ];
    if let Some(message) = app.message.as_ref() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(message.clone(), Style::default().fg(Color::Red)));
    }

    let player = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(player, area);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let text = Line::from(vec![
        key("space"),
        Span::raw(" play/pause  "),
        key("enter"),
        Span::raw(" play ayah  "),
        key("s"),
        Span::raw(" stop  "),
        key("n"),
        Span::raw(" narrator  "),
        key("b"),
        Span::raw(" bookmark  "),
        key("m"),
        Span::raw(" bookmarks  "),
        key("g"),
        Span::raw(" surahs  "),
        key("t"),
        Span::raw(" tafsir  "),
        key("q"),
        Span::raw(" quit"),
    ]);
    f.render_widget(Paragraph::new(text).alignment(Alignment::Center), area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn overlay_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan))
}

fn draw_bookmarks(f: &mut Frame, area: Rect, app: &mut App) {
    let rect = centered(area, 60, 60);
    f.render_widget(Clear, rect);

    let bookmarks = app.bookmarks.list();
    if bookmarks.is_empty() {
        let empty = Paragraph::new("No bookmarks yet. Press b on an ayah to add one.")
            .block(overlay_block("Bookmarks"))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(empty, rect);
        return;
    }

    let items: Vec<ListItem> = bookmarks
        .iter()
        .map(|b| {
            ListItem::new(Line::from(vec![
                Span::styled(b.section_name.clone(), Style::default().fg(Color::Yellow)),
                Span::raw(format!("  ayah {}  page {}  ", b.ordinal, b.page)),
                Span::styled(
                    b.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(overlay_block("Bookmarks (enter: open, d: delete)"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, rect, &mut app.bookmark_list_state);
}

fn draw_sections(f: &mut Frame, area: Rect, app: &mut App) {
    let rect = centered(area, 60, 70);
    f.render_widget(Clear, rect);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(rect);

    let search = Paragraph::new(format!("{}▏", app.section_query)).block(overlay_block("Search surah"));
    f.render_widget(search, layout[0]);

    let items: Vec<ListItem> = app
        .filtered_sections()
        .into_iter()
        .map(|s| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>3}. ", s.id), Style::default().fg(Color::DarkGray)),
                Span::styled(s.english_name.clone(), Style::default().fg(Color::White)),
                Span::raw(format!("  {}  ", s.translation)),
                Span::styled(s.name.clone(), Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!("  {} ayahs", s.unit_count),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let title = if app.sections.is_empty() {
        "Surahs (loading...)"
    } else {
        "Surahs"
    };
    let list = List::new(items)
        .block(overlay_block(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, layout[1], &mut app.section_list_state);
}

fn draw_tafsir(f: &mut Frame, area: Rect, app: &App) {
    let rect = centered(area, 70, 60);
    f.render_widget(Clear, rect);

    let (title, body) = match app.tafsir.as_ref() {
        Some((unit, Some(text))) => (format!("Tafsir · ayah {}", unit), text.clone()),
        Some((unit, None)) => (format!("Tafsir · ayah {}", unit), "Loading...".to_string()),
        None => ("Tafsir".to_string(), String::new()),
    };

    let paragraph = Paragraph::new(body)
        .block(overlay_block(&title))
        .alignment(Alignment::Right)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, rect);
}
