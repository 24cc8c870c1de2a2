mod ui;

use taha_tui::backend::Result as EngineResult;
use taha_tui::backend::alquran::AlQuranClient;
use taha_tui::backend::annotation::AnnotationFetcher;
use taha_tui::backend::audio::{AudioAssets, AudioUrlTemplate, ClockOutput};
use taha_tui::backend::bookmarks::BookmarkStore;
use taha_tui::backend::cache::AssetCache;
use taha_tui::backend::gesture::{GestureNavigator, NavDirection, ReadingDirection, Swipe};
use taha_tui::backend::kv::JsonFileStore;
use taha_tui::backend::model::{Page, SectionSummary, TOTAL_PAGES, UnitId};
use taha_tui::backend::page_store::PageStore;
use taha_tui::backend::playback::{ControllerEvents, PlaybackController};
use taha_tui::config::{self, Settings};
use taha_tui::logging;
use ui::ui::{App, Overlay, ui};

use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{error::Error, io, sync::Arc};
use tokio::sync::mpsc;

// Rough size of a terminal cell in logical units, so the swipe threshold
// means about the same distance as on a touch screen.
const CELL_WIDTH: f32 = 8.0;
const CELL_HEIGHT: f32 = 16.0;

enum BackgroundTask {
    SectionsLoaded { sections: Vec<SectionSummary> },
    AnnotationLoaded { unit: UnitId, text: String },
    PageLoaded { request: u64, result: EngineResult<(Page, Option<UnitId>)> },
}

#[derive(Clone, Copy)]
enum PageTarget {
    Number(u32),
    /// Page holding the first ayah of a surah.
    SectionStart(u32),
}

/// Everything the input handlers drive besides the [`App`] view state.
struct Reader {
    pages: PageStore,
    controller: PlaybackController,
    navigator: GestureNavigator,
    annotations: AnnotationFetcher,
    settings: Settings,
    task_tx: mpsc::UnboundedSender<BackgroundTask>,
    /// Bumped per navigation so only the latest page load lands.
    page_request: u64,
    drag_start: Option<(u16, u16)>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_file = logging::init();
    let settings = Settings::load();
    log::info!("starting taha-tui, log file {:?}", log_file);

    let client = AlQuranClient::new(settings.api_base.clone(), settings.tafsir_edition.clone())?;
    let pages = PageStore::new(Arc::new(client.clone()), TOTAL_PAGES, settings.cached_pages);
    let urls = AudioUrlTemplate::new(settings.audio_base.clone(), settings.bitrate);
    let output = Box::new(ClockOutput::new(urls.bitrate()));
    let assets = AudioAssets::new(Arc::new(client.clone()), AssetCache::new(), urls);
    let (controller, events) =
        PlaybackController::new(pages.clone(), assets, output, settings.narrator);

    let store = JsonFileStore::open(JsonFileStore::default_path())?;
    log::info!("bookmarks stored in {}", store.path().display());
    let bookmarks = BookmarkStore::open(Box::new(store))?;

    let (task_tx, task_rx) = mpsc::unbounded_channel::<BackgroundTask>();
    let start_page = settings.start_page;
    let mut reader = Reader {
        pages,
        controller,
        navigator: GestureNavigator::new(
            settings.reading_direction,
            settings.swipe_threshold,
            start_page,
        ),
        annotations: AnnotationFetcher::new(Arc::new(client)),
        settings,
        task_tx,
        page_request: 0,
        drag_start: None,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(bookmarks);
    request_page(&mut app, &mut reader, PageTarget::Number(start_page), None);

    let res = run_app(&mut terminal, &mut app, &mut reader, events, task_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("{}", err);
        eprintln!("{err}");
    }
    Ok(())
}

fn spawn_sections_loader(pages: PageStore, tx: mpsc::UnboundedSender<BackgroundTask>) {
    tokio::spawn(async move {
        match pages.sections().await {
            Ok(sections) => {
                let _ = tx.send(BackgroundTask::SectionsLoaded { sections });
            }
            Err(e) => log::warn!("surah list failed: {}", e),
        }
    });
}

fn spawn_annotation_loader(
    annotations: AnnotationFetcher,
    unit: UnitId,
    tx: mpsc::UnboundedSender<BackgroundTask>,
) {
    tokio::spawn(async move {
        let text = annotations.fetch(unit).await;
        let _ = tx.send(BackgroundTask::AnnotationLoaded { unit, text });
    });
}

fn spawn_page_loader(
    pages: PageStore,
    target: PageTarget,
    focus: Option<UnitId>,
    request: u64,
    tx: mpsc::UnboundedSender<BackgroundTask>,
) {
    tokio::spawn(async move {
        let result = match target {
            PageTarget::Number(number) => pages.load(number).await.map(|page| (page, focus)),
            PageTarget::SectionStart(section) => {
                pages.load_start_page_for_section(section).await.map(|page| {
                    let opening = page
                        .units
                        .iter()
                        .find(|u| u.section.id == section && u.ordinal == 1)
                        .map(|u| u.id);
                    (page, opening)
                })
            }
        };
        let _ = tx.send(BackgroundTask::PageLoaded { request, result });
    });
}

/// Starts loading a page in the background; it is shown once
/// [`BackgroundTask::PageLoaded`] comes back.
fn request_page(app: &mut App, reader: &mut Reader, target: PageTarget, focus: Option<UnitId>) {
    reader.page_request += 1;
    let message = match target {
        PageTarget::Number(number) => format!("Fetching page {}...", number),
        PageTarget::SectionStart(section) => format!("Fetching surah {}...", section),
    };
    app.set_loading(&message);
    spawn_page_loader(
        reader.pages.clone(),
        target,
        focus,
        reader.page_request,
        reader.task_tx.clone(),
    );
}

fn page_loaded(
    app: &mut App,
    reader: &mut Reader,
    request: u64,
    result: EngineResult<(Page, Option<UnitId>)>,
) {
    if request != reader.page_request {
        log::debug!("dropping page load {} (latest {})", request, reader.page_request);
        return;
    }
    match result {
        Ok((page, focus)) => {
            reader.navigator.arrive(page.clone(), &mut reader.controller);
            app.message = None;
            app.set_page(page, focus);
        }
        Err(e) => {
            log::warn!("page load failed: {}", e);
            app.set_ready();
            app.message = Some(e.to_string());
        }
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    reader: &mut Reader,
    mut events: ControllerEvents,
    mut task_rx: mpsc::UnboundedReceiver<BackgroundTask>,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();
    app.follow_playback(reader.controller.snapshot());

    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            // Redraw the spinner while loading
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(100)) => {}

            Some(Ok(event)) = event_stream.next() => {
                match event {
                    Event::Key(key) => {
                        if key.code == KeyCode::Char('q') && app.overlay != Overlay::Sections {
                            return Ok(());
                        }
                        match app.overlay {
                            Overlay::None => handle_reader_input(app, reader, key.code),
                            Overlay::Bookmarks => handle_bookmarks_input(app, reader, key.code),
                            Overlay::Sections => handle_sections_input(app, reader, key.code),
                            Overlay::Tafsir => {
                                if matches!(key.code, KeyCode::Esc | KeyCode::Char('t')) {
                                    app.close_overlay();
                                }
                            }
                        }
                    }
                    Event::Mouse(mouse) if app.overlay == Overlay::None => {
                        handle_mouse(app, reader, mouse);
                    }
                    _ => {}
                }
                app.follow_playback(reader.controller.snapshot());
            }

            Some(event) = events.recv() => {
                if let Err(e) = reader.controller.handle(event) {
                    app.message = Some(e.to_string());
                }
                sync_with_playback(app, reader);
            }

            Some(task) = task_rx.recv() => {
                match task {
                    BackgroundTask::SectionsLoaded { sections } => {
                        app.sections = sections;
                    }
                    BackgroundTask::AnnotationLoaded { unit, text } => {
                        if matches!(app.tafsir, Some((u, _)) if u == unit) {
                            app.tafsir = Some((unit, Some(text)));
                        }
                    }
                    BackgroundTask::PageLoaded { request, result } => {
                        page_loaded(app, reader, request, result);
                        app.follow_playback(reader.controller.snapshot());
                    }
                }
            }
        }
    }
}

/// Playback may have continued onto the next page on its own.
fn sync_with_playback(app: &mut App, reader: &mut Reader) {
    if let Some(page) = reader.controller.page() {
        let moved = app.page.as_ref().map(|p| p.number) != Some(page.number);
        if moved {
            let page = page.clone();
            reader.navigator.sync_page(page.number);
            app.set_page(page, reader.controller.snapshot().current);
        }
    }
    app.follow_playback(reader.controller.snapshot());
}

fn turn_page(app: &mut App, reader: &mut Reader, direction: NavDirection) {
    if let Some(target) = reader.navigator.target(direction, &reader.pages) {
        request_page(app, reader, PageTarget::Number(target), None);
    }
}

/// Remembers the narrator for the next start.
fn save_narrator(app: &mut App, reader: &mut Reader) {
    reader.settings.narrator = reader.controller.narrator();
    let path = config::settings_path();
    if let Err(e) = reader.settings.save_to(&path) {
        log::warn!("could not save settings to {}: {}", path.display(), e);
        app.message = Some(format!("settings not saved: {}", e));
    }
}

fn handle_reader_input(app: &mut App, reader: &mut Reader, key: KeyCode) {
    // Arrow keys follow the page layout: in right-to-left reading the next
    // page sits to the left.
    let (left, right) = match reader.settings.reading_direction {
        ReadingDirection::Rtl => (NavDirection::Advance, NavDirection::Retreat),
        ReadingDirection::Ltr => (NavDirection::Retreat, NavDirection::Advance),
    };

    let result = match key {
        KeyCode::Left => {
            turn_page(app, reader, left);
            Ok(())
        }
        KeyCode::Right => {
            turn_page(app, reader, right);
            Ok(())
        }
        KeyCode::Up => {
            app.move_selection(-1);
            Ok(())
        }
        KeyCode::Down => {
            app.move_selection(1);
            Ok(())
        }
        KeyCode::Enter => match app.selected_unit() {
            Some(unit) => reader.controller.play(unit.id),
            None => Ok(()),
        },
        KeyCode::Char(' ') => reader.controller.toggle(),
        KeyCode::Char('s') => {
            reader.controller.stop();
            Ok(())
        }
        KeyCode::Char('n') => {
            let next = reader.controller.narrator().next();
            let switched = reader.controller.switch_narrator(next);
            save_narrator(app, reader);
            switched
        }
        KeyCode::Char('b') => {
            let page = app.page.as_ref().map(|p| p.number).unwrap_or_default();
            match app.selected_unit().cloned() {
                Some(unit) => app.bookmarks.toggle(&unit, page).map(|_| ()),
                None => Ok(()),
            }
        }
        KeyCode::Char('t') => {
            if let Some(unit) = app.selected_unit().map(|u| u.id) {
                app.tafsir = Some((unit, None));
                app.open_overlay(Overlay::Tafsir);
                spawn_annotation_loader(reader.annotations.clone(), unit, reader.task_tx.clone());
            }
            Ok(())
        }
        KeyCode::Char('c') => {
            if let Some(bookmark) = app.bookmarks.latest() {
                request_page(app, reader, PageTarget::Number(bookmark.page), Some(bookmark.unit_id));
            }
            Ok(())
        }
        KeyCode::Char('m') | KeyCode::Char('B') => {
            app.open_overlay(Overlay::Bookmarks);
            Ok(())
        }
        KeyCode::Char('g') => {
            if app.sections.is_empty() {
                spawn_sections_loader(reader.pages.clone(), reader.task_tx.clone());
            }
            app.open_overlay(Overlay::Sections);
            Ok(())
        }
        _ => Ok(()),
    };

    if let Err(e) = result {
        app.message = Some(e.to_string());
    }
}

fn handle_bookmarks_input(app: &mut App, reader: &mut Reader, key: KeyCode) {
    let count = app.bookmarks.len();
    let selected = app.bookmark_list_state.selected().unwrap_or(0);
    match key {
        KeyCode::Esc | KeyCode::Char('m') | KeyCode::Char('B') => app.close_overlay(),
        KeyCode::Up => app.bookmark_list_state.select(Some(selected.saturating_sub(1))),
        KeyCode::Down => {
            let next = (selected + 1).min(count.saturating_sub(1));
            app.bookmark_list_state.select(Some(next));
        }
        KeyCode::Char('d') => {
            if let Some(bookmark) = app.selected_bookmark() {
                if let Err(e) = app.bookmarks.remove(bookmark.unit_id) {
                    app.message = Some(e.to_string());
                }
                let last = app.bookmarks.len().saturating_sub(1);
                app.bookmark_list_state.select(Some(selected.min(last)));
            }
        }
        KeyCode::Enter => {
            if let Some(bookmark) = app.selected_bookmark() {
                app.close_overlay();
                request_page(app, reader, PageTarget::Number(bookmark.page), Some(bookmark.unit_id));
            }
        }
        _ => {}
    }
}

fn handle_sections_input(app: &mut App, reader: &mut Reader, key: KeyCode) {
    let count = app.filtered_sections().len();
    let selected = app.section_list_state.selected().unwrap_or(0);
    match key {
        KeyCode::Esc => app.close_overlay(),
        KeyCode::Up => app.section_list_state.select(Some(selected.saturating_sub(1))),
        KeyCode::Down => {
            let next = (selected + 1).min(count.saturating_sub(1));
            app.section_list_state.select(Some(next));
        }
        KeyCode::Char(c) => {
            app.section_query.push(c);
            app.section_list_state.select(Some(0));
        }
        KeyCode::Backspace => {
            app.section_query.pop();
            app.section_list_state.select(Some(0));
        }
        KeyCode::Enter => {
            if let Some(section) = app.selected_section() {
                app.close_overlay();
                request_page(app, reader, PageTarget::SectionStart(section), None);
            }
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, reader: &mut Reader, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            reader.drag_start = Some((mouse.column, mouse.row));
        }
        MouseEventKind::Up(MouseButton::Left) => {
            let Some((col, row)) = reader.drag_start.take() else {
                return;
            };
            let swipe = Swipe::new(
                (f32::from(col) * CELL_WIDTH, f32::from(row) * CELL_HEIGHT),
                (
                    f32::from(mouse.column) * CELL_WIDTH,
                    f32::from(mouse.row) * CELL_HEIGHT,
                ),
            );
            if let Some(direction) = reader.navigator.classify(&swipe) {
                turn_page(app, reader, direction);
            }
        }
        _ => {}
    }
}
