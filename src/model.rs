use std::collections::HashMap;
use std::time::Instant;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};

use crate::backend::OptimizationBackend;
use crate::domain::{AppConfig, CMDMode, DEFAULT_PAGE_SIZE, HELP_TEXT, InvError, Message, PAGE_SIZE_OPTIONS};
use crate::inputter::{InputResult, Inputter};
use crate::rows::Row;
use crate::serializer::row_to_csv_line;
use crate::state::{StateStore, WizardStep};
use crate::table::Table;
use crate::ui::{
    CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, SCROLLBAR_WIDTH, TABLE_HEADER_HEIGHT, TABS_HEIGHT,
};
use crate::view::{SortDirection, SortKey, ViewQuery, apply, page_count};
use crate::workflow::Workflow;

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

/// What the table view currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    File(String),
    Results,
}

impl Source {
    fn label(&self) -> String {
        match self {
            Source::File(name) => name.clone(),
            Source::Results => "Results".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    POPUP,
    CMDINPUT,
}

struct TableView {
    name: String,
    header: Vec<String>,
    rows: Vec<Row>, // Rows of the current page, already filtered and sorted
    total: usize,   // Matching rows across all pages
    page: usize,
    page_size: usize,
    visible_columns: Vec<usize>, // Idx of columns sent to the UI for rendering
    visible_width: usize,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize,
    offset_column: usize,
    data: Vec<ColumnView>,
    show_index: bool,
    index: ColumnView,
    heigh: usize,
    width: usize,
}

impl TableView {
    fn empty() -> Self {
        TableView {
            name: String::new(),
            header: Vec::new(),
            rows: Vec::new(),
            total: 0,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            visible_columns: Vec::new(),
            visible_width: 0,
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            data: Vec::new(),
            show_index: true,
            index: ColumnView::default(),
            heigh: 0,
            width: 0,
        }
    }

    fn reset_cursor(&mut self) {
        self.curser_row = 0;
        self.offset_row = 0;
    }

    fn page_count(&self) -> usize {
        page_count(self.total, self.page_size)
    }

    fn current_row(&self) -> Option<&Row> {
        self.rows.get(self.offset_row + self.curser_row)
    }

    fn current_column(&self) -> Option<usize> {
        self.visible_columns.get(self.curser_column).copied()
    }

    fn build_index(&mut self) {
        let rbegin = std::cmp::min(self.offset_row, self.rows.len());
        let rend = std::cmp::min(rbegin + self.heigh, self.rows.len());

        let data = self.rows[rbegin..rend]
            .iter()
            .map(|row| row.id.to_string())
            .collect::<Vec<String>>();
        let width = data
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(3);
        self.index = ColumnView {
            name: "#".to_string(),
            width,
            data,
        }
    }
}

struct RecordView {
    header_data: Vec<String>,
    header_width: usize,
    header_view: ColumnView,
    row_data: Vec<String>,
    row_width: usize,
    row_view: ColumnView,
    record_idx: usize, // Index in TableView.rows
    curser_row: usize,
    curser_offset: usize,
    height: usize,
    width: usize,
}

impl RecordView {
    fn empty() -> Self {
        RecordView {
            header_data: Vec::new(),
            header_width: 0,
            header_view: ColumnView::default(),
            row_data: Vec::new(),
            row_width: 0,
            row_view: ColumnView::default(),
            record_idx: 0,
            curser_row: 0,
            curser_offset: 0,
            height: 0,
            width: 0,
        }
    }
}

pub struct UIData {
    pub name: String,
    pub tabs: Vec<String>,
    pub selected_tab: usize,
    pub step: WizardStep,
    pub available_steps: Vec<WizardStep>,
    pub table: Vec<ColumnView>,
    pub index: ColumnView,
    pub show_index: bool,
    pub nrows: usize, // Matching rows across all pages
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub sort: Option<SortKey>,
    pub filter: String,
    pub summary: Option<String>,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub last_update: Instant,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            tabs: Vec::new(),
            selected_tab: 0,
            step: WizardStep::Upload,
            available_steps: vec![WizardStep::Upload],
            table: Vec::new(),
            index: ColumnView::default(),
            show_index: false,
            nrows: 0,
            page: 0,
            page_count: 0,
            page_size: DEFAULT_PAGE_SIZE,
            selected_row: 0,
            selected_column: 0,
            sort: None,
            filter: String::new(),
            summary: None,
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            last_update: Instant::now(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub index_width: usize,
    pub index_height: usize,
    pub statusline_width: usize,
    pub statusline_height: usize,
}

impl UILayout {
    pub fn from_values(index_width: usize, ui_width: usize, ui_height: usize) -> Self {
        let cmdline_heigth = CMDLINE_HEIGH;
        let cmdline_width = ui_width;

        // The index is rendered with one spacer column
        let index_total = if index_width > 0 { index_width + 1 } else { 0 };
        let table_width = ui_width.saturating_sub(SCROLLBAR_WIDTH + index_total);
        let table_height =
            ui_height.saturating_sub(TABS_HEIGHT + cmdline_heigth + TABLE_HEADER_HEIGHT);
        let index_height = table_height;

        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            index_width,
            index_height,
            statusline_width: cmdline_width,
            statusline_height: cmdline_heigth,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model<S: StateStore, B: OptimizationBackend> {
    config: AppConfig,
    workflow: Workflow<S, B>,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    source: Option<Source>,
    sessions: HashMap<Source, ViewQuery>,
    table: TableView,
    record_view: RecordView,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    edit_target: Option<(String, String, usize)>, // file, column, table row index
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
}

impl<S: StateStore, B: OptimizationBackend> Model<S, B> {
    pub fn init(
        config: &AppConfig,
        workflow: Workflow<S, B>,
        ui_width: usize,
        ui_height: usize,
    ) -> Result<Self, InvError> {
        let mut model = Self {
            config: config.clone(),
            workflow,
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            source: None,
            sessions: HashMap::new(),
            table: TableView::empty(),
            record_view: RecordView::empty(),
            uilayout: UILayout::from_values(0, ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            edit_target: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: String::new(),
        };
        model.source = match model.workflow.state().current_step() {
            WizardStep::Results => Some(Source::Results),
            _ => model.sources().into_iter().next(),
        };
        model.refresh_view()?;
        model.set_status_message(match model.source {
            Some(_) => "Press ? for help",
            None => "No data loaded. Upload files with `invopt upload <FILES>`",
        });
        Ok(model)
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn sources(&self) -> Vec<Source> {
        let state = self.workflow.state();
        let mut sources: Vec<Source> = state
            .uploaded_files
            .iter()
            .map(|f| Source::File(f.name.clone()))
            .collect();
        if state.optimization_results.is_some() {
            sources.push(Source::Results);
        }
        sources
    }

    fn current_table(&self) -> Option<&Table> {
        let state = self.workflow.state();
        match self.source.as_ref()? {
            Source::File(name) => state.file(name).map(|f| &f.table),
            Source::Results => state.optimization_results.as_ref().map(|r| &r.data),
        }
    }

    fn query(&self) -> ViewQuery {
        self.source
            .as_ref()
            .and_then(|s| self.sessions.get(s))
            .cloned()
            .unwrap_or_else(|| ViewQuery::default().with_page(0, self.config.page_size))
    }

    fn set_query(&mut self, query: ViewQuery) {
        if let Some(source) = self.source.clone() {
            self.sessions.insert(source, query);
        }
    }

    /// Recomputes the current page from the source table and the session query.
    fn refresh_view(&mut self) -> Result<(), InvError> {
        let start_time = Instant::now();
        let snapshot = self.current_table().map(|t| t.snapshot());
        let (Some(source), Some(snapshot)) = (self.source.clone(), snapshot) else {
            let show_index = self.table.show_index;
            self.table = TableView::empty();
            self.table.show_index = show_index;
            self.update_table_data();
            return Ok(());
        };

        let mut query = self.query();
        let mut result = apply(&snapshot, &query)?;
        let pages = page_count(result.total, query.page_size);
        if pages > 0 && query.page >= pages {
            query.page = pages - 1;
            result = apply(&snapshot, &query)?;
        }
        self.sessions.insert(source.clone(), query.clone());

        let table = &mut self.table;
        table.name = source.label();
        table.header = snapshot.header().to_vec();
        table.rows = result.rows;
        table.total = result.total;
        table.page = query.page;
        table.page_size = query.page_size;
        if table.offset_row + table.curser_row >= table.rows.len() {
            table.reset_cursor();
        }
        debug!(
            "View of \"{}\": page {}/{}, {} matches in {}ms",
            table.name,
            table.page + 1,
            table.page_count(),
            table.total,
            start_time.elapsed().as_millis()
        );
        self.update_layout();
        self.update_table_data();
        Ok(())
    }

    fn update_layout(&mut self) {
        let index_width = if self.table.show_index {
            self.table
                .rows
                .iter()
                .map(|r| r.id.to_string().chars().count())
                .max()
                .unwrap_or(1)
        } else {
            0
        };
        self.uilayout = UILayout::from_values(index_width, self.uilayout.width, self.uilayout.height);
    }

    fn switch_source(&mut self, source: Option<Source>) -> Result<(), InvError> {
        trace!("Switch source to {:?}", source);
        self.source = source;
        self.table.reset_cursor();
        self.table.curser_column = 0;
        self.table.offset_column = 0;
        self.modus = Modus::TABLE;
        self.refresh_view()
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    fn results_summary(&self) -> Option<String> {
        if self.source != Some(Source::Results) {
            return None;
        }
        let state = self.workflow.state();
        state.optimization_results.as_ref().map(|r| {
            format!(
                "Total savings {:.2} | Avg. stock reduction {:.1}% | {}{}",
                r.summary.total_savings,
                r.summary.average_stock_reduction,
                r.summary.optimization_date.format("%Y-%m-%d %H:%M"),
                if state.using_demo_data { " | demo data" } else { "" }
            )
        })
    }

    fn update_uidata_for_table(&mut self) {
        let sources = self.sources();
        let state = self.workflow.state();
        let table = &self.table;
        let query = self.query();
        self.uidata = UIData {
            name: table.name.clone(),
            tabs: sources.iter().map(|s| s.label()).collect(),
            selected_tab: self
                .source
                .as_ref()
                .and_then(|s| sources.iter().position(|x| x == s))
                .unwrap_or(0),
            step: state.current_step(),
            available_steps: state.available_steps(),
            table: table.data.clone(),
            index: table.index.clone(),
            show_index: table.show_index,
            nrows: table.total,
            page: table.page,
            page_count: table.page_count(),
            page_size: table.page_size,
            selected_row: table.curser_row,
            selected_column: table.curser_column,
            sort: query.sort,
            filter: query.filter,
            summary: self.results_summary(),
            show_popup: false,
            popup_message: String::new(),
            layout: self.uilayout.clone(),
            last_update: Instant::now(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
        }
    }

    fn update_uidata_for_record(&mut self) {
        let record = &self.record_view;
        self.uidata.name = format!("R[{}]", self.table.name);
        self.uidata.table = vec![record.header_view.clone(), record.row_view.clone()];
        self.uidata.show_index = false;
        self.uidata.selected_row = record.curser_row;
        self.uidata.selected_column = 1;
        self.uidata.layout = self.uilayout.clone();
        self.uidata.last_update = Instant::now();
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced_name: String = name.chars().take(width - 3).collect();
            reduced_name.push_str("...");
            reduced_name
        } else {
            name.to_string()
        }
    }

    fn update_table_data(&mut self) {
        let query = self.query();
        let max_column_width = self.config.max_column_width.max(1);
        let table = &mut self.table;

        table.width = self.uilayout.table_width;
        table.heigh = self.uilayout.table_height;

        if table.header.is_empty() {
            table.visible_columns.clear();
            table.data.clear();
            table.build_index();
            self.update_uidata_for_table();
            return;
        }

        let rbegin = std::cmp::min(table.offset_row, table.rows.len());
        let rend = std::cmp::min(rbegin + table.heigh, table.rows.len());
        table.offset_column = std::cmp::min(table.offset_column, table.header.len() - 1);

        trace!(
            "Table: I:{}, Cr {}, Cc {}, Or {}, Oc {}, Rb {}, Re {}, tw: {}, th:{}",
            table.show_index,
            table.curser_row,
            table.curser_column,
            table.offset_row,
            table.offset_column,
            rbegin,
            rend,
            table.width,
            table.heigh,
        );

        // Widths come from the whole page so they stay stable while scrolling
        let mut render_widths: Vec<usize> = table
            .header
            .iter()
            .enumerate()
            .map(|(cidx, name)| {
                let data_width = table
                    .rows
                    .iter()
                    .map(|r| r.values()[cidx].render().chars().count())
                    .max()
                    .unwrap_or(0);
                // room for the sort marker
                let name_width = name.chars().count() + 2;
                std::cmp::min(std::cmp::max(name_width, data_width), max_column_width)
            })
            .collect();

        table.visible_columns = Vec::new();
        let mut visible_width = 0;
        for cidx in table.offset_column..table.header.len() {
            let width = render_widths[cidx];
            if visible_width + width + COLUMN_WIDTH_MARGIN <= table.width {
                table.visible_columns.push(cidx);
                visible_width += width + COLUMN_WIDTH_MARGIN;
            } else {
                // Add the last partial visible column
                if visible_width < table.width {
                    let remaining_width = table.width - visible_width;
                    table.visible_columns.push(cidx);
                    render_widths[cidx] = remaining_width;
                    visible_width += remaining_width;
                }
                break;
            }
        }
        table.visible_width = visible_width;
        table.curser_column = std::cmp::min(
            table.curser_column,
            table.visible_columns.len().saturating_sub(1),
        );

        table.data = Vec::with_capacity(table.visible_columns.len());
        for &cidx in table.visible_columns.iter() {
            let width = render_widths[cidx];
            let marker = match &query.sort {
                Some(key) if key.column == table.header[cidx] => match key.direction {
                    SortDirection::Ascending => " ▲",
                    SortDirection::Descending => " ▼",
                },
                _ => "",
            };
            let name = Self::get_visible_name(&format!("{}{}", table.header[cidx], marker), width);
            let data = table.rows[rbegin..rend]
                .iter()
                .map(|row| row.values()[cidx].render())
                .collect();
            table.data.push(ColumnView { name, width, data });
        }

        table.build_index();
        self.update_uidata_for_table();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout.width = width;
        self.uilayout.height = height;
        self.update_layout();
        match self.modus {
            Modus::RECORD => {
                self.record_view.height = self.uilayout.table_height;
                self.record_view.width = self.uilayout.table_width;
                self.update_record_data();
            }
            _ => self.update_table_data(),
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), InvError> {
        let Some(msg) = message else {
            return Ok(());
        };
        let result = match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => {
                    self.quit();
                    Ok(())
                }
                Message::MoveDown => self.move_table_selection_down(1),
                Message::MoveUp => self.move_table_selection_up(1),
                Message::MoveLeft => self.move_table_selection_left(),
                Message::MoveRight => self.move_table_selection_right(),
                Message::MoveBeginning => self.move_table_selection_beginning(),
                Message::MoveEnd => self.move_table_selection_end(),
                Message::NextPage => self.change_page(1),
                Message::PreviousPage => self.change_page(-1),
                Message::CyclePageSize => self.cycle_page_size(),
                Message::NextFile => self.cycle_source(1),
                Message::PreviousFile => self.cycle_source(-1),
                Message::SortAscending => self.sort_current_column(SortDirection::Ascending),
                Message::SortDescending => self.sort_current_column(SortDirection::Descending),
                Message::Filter => {
                    let filter = self.query().filter;
                    self.enter_cmd_mode(CMDMode::Filter, &filter);
                    Ok(())
                }
                Message::ClearFilter => self.clear_filter(),
                Message::EditCell => self.start_cell_edit(),
                Message::ToggleIndex => self.toggle_table_index(),
                Message::CopyCell => self.copy_table_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::Optimize => self.optimize(),
                Message::ShowResults => self.show_results(),
                Message::ExportResults => self.export_results(),
                Message::DeleteFile => self.delete_file(),
                Message::Resize(width, height) => {
                    self.ui_resize(width, height);
                    Ok(())
                }
                Message::Help => self.show_help(),
                Message::Enter => self.enter(),
                Message::Exit => self.exit(),
                Message::RawKey(_) => Ok(()),
            },
            Modus::RECORD => match msg {
                Message::Quit => {
                    self.quit();
                    Ok(())
                }
                Message::MoveDown => self.move_record_selection_down(1),
                Message::MoveUp => self.move_record_selection_up(1),
                Message::MoveLeft => self.previous_record(),
                Message::MoveRight => self.next_record(),
                Message::NextPage => self.move_record_selection_down(10),
                Message::PreviousPage => self.move_record_selection_up(10),
                Message::CopyCell => self.copy_record_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::Resize(width, height) => {
                    self.ui_resize(width, height);
                    Ok(())
                }
                Message::Help => self.show_help(),
                Message::Exit | Message::Enter => self.exit(),
                _ => Ok(()),
            },
            Modus::POPUP => match msg {
                Message::Quit => {
                    self.quit();
                    Ok(())
                }
                Message::Resize(width, height) => {
                    self.ui_resize(width, height);
                    Ok(())
                }
                Message::Exit | Message::Enter | Message::Help => self.exit(),
                _ => Ok(()),
            },
            Modus::CMDINPUT => match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => {
                    self.ui_resize(width, height);
                    Ok(())
                }
                _ => Ok(()),
            },
        };

        // Failed operations are reported in the status line, the session goes on
        if let Err(e) = result {
            error!("Operation failed: {e}");
            self.set_status_message(format!("Error: {e}"));
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) -> Result<(), InvError> {
        if self.modus == Modus::TABLE && self.table.current_row().is_some() {
            let record_idx = self.table.offset_row + self.table.curser_row;
            self.build_record_view(record_idx);
            self.previous_modus = Modus::TABLE;
            self.modus = Modus::RECORD;
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), InvError> {
        match self.modus {
            Modus::TABLE => {}
            Modus::RECORD => {
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
                self.update_table_data();
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
                self.uidata.last_update = Instant::now();
            }
            Modus::CMDINPUT => {}
        }
        Ok(())
    }

    fn show_help(&mut self) -> Result<(), InvError> {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
        self.uidata.last_update = Instant::now();
        Ok(())
    }

    fn raw_input(&mut self, key: KeyEvent) -> Result<(), InvError> {
        if !self.active_cmdinput {
            return Ok(());
        }
        self.last_input = self.input.read(key);
        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.last_update = Instant::now();
        if self.last_input.finished {
            self.handle_cmd_input()?;
        }
        Ok(())
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, prefill: &str) {
        trace!("Entering command mode {:?} ...", mode);
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);

        self.active_cmdinput = true;
        self.input.clear();
        self.input.set(prefill);
        self.last_input = self.input.get();

        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_cmdinput = self.active_cmdinput;
        self.uidata.cmd_mode = self.cmd_mode;
        self.uidata.last_update = Instant::now();
    }

    fn handle_cmd_input(&mut self) -> Result<(), InvError> {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        let mode = self.cmd_mode.take();
        let edit_target = self.edit_target.take();

        if self.last_input.canceled {
            self.last_input = InputResult::default();
            self.update_table_data();
            return Ok(());
        }

        let cmd_input = std::mem::take(&mut self.last_input).input;
        match mode {
            Some(CMDMode::Filter) => self.filter(&cmd_input),
            Some(CMDMode::EditCell) => match edit_target {
                Some((file, column, row)) => self.apply_cell_edit(&file, &column, row, &cmd_input),
                None => Ok(()),
            },
            None => {
                info!("Cmd mode is none!");
                Ok(())
            }
        }
    }

    fn filter(&mut self, term: &str) -> Result<(), InvError> {
        trace!("Starting filter for {} ...", term);
        let query = self.query().with_filter(term).with_page(0, self.table.page_size);
        self.set_query(query);
        self.table.reset_cursor();
        self.refresh_view()?;
        self.set_status_message(format!("{} matching rows", self.table.total));
        Ok(())
    }

    fn clear_filter(&mut self) -> Result<(), InvError> {
        let page_size = self.table.page_size;
        self.set_query(ViewQuery::default().with_page(0, page_size));
        self.table.reset_cursor();
        self.refresh_view()?;
        self.set_status_message("Cleared filter and sort");
        Ok(())
    }

    fn sort_current_column(&mut self, direction: SortDirection) -> Result<(), InvError> {
        let Some(cidx) = self.table.current_column() else {
            return Ok(());
        };
        let column = self.table.header[cidx].clone();
        let mut query = self.query();
        query.sort = Some(SortKey {
            column: column.clone(),
            direction,
        });
        query.page = 0;
        self.set_query(query);
        self.table.reset_cursor();
        self.refresh_view()?;
        self.set_status_message(format!("Sorted by {column} ({direction:?})"));
        Ok(())
    }

    fn change_page(&mut self, step: i64) -> Result<(), InvError> {
        let pages = self.table.page_count();
        if pages == 0 {
            return Ok(());
        }
        let page = (self.table.page as i64 + step).clamp(0, pages as i64 - 1) as usize;
        if page != self.table.page {
            let query = self.query().with_page(page, self.table.page_size);
            self.set_query(query);
            self.table.reset_cursor();
            self.refresh_view()?;
        }
        Ok(())
    }

    fn cycle_page_size(&mut self) -> Result<(), InvError> {
        let current = self.table.page_size;
        let next = PAGE_SIZE_OPTIONS
            .iter()
            .position(|&s| s == current)
            .map(|i| PAGE_SIZE_OPTIONS[(i + 1) % PAGE_SIZE_OPTIONS.len()])
            .unwrap_or(DEFAULT_PAGE_SIZE);
        // Keep the selected row on screen
        let abs_row = self.table.page * current + self.table.offset_row + self.table.curser_row;
        let query = self.query().with_page(abs_row / next, next);
        self.set_query(query);
        self.table.reset_cursor();
        self.refresh_view()?;
        self.select_row(abs_row % next);
        self.set_status_message(format!("{next} rows per page"));
        Ok(())
    }

    fn cycle_source(&mut self, step: i64) -> Result<(), InvError> {
        let sources = self.sources();
        if sources.is_empty() {
            return Ok(());
        }
        let current = self
            .source
            .as_ref()
            .and_then(|s| sources.iter().position(|x| x == s))
            .unwrap_or(0) as i64;
        let next = (current + step).rem_euclid(sources.len() as i64) as usize;
        self.switch_source(Some(sources[next].clone()))
    }

    fn start_cell_edit(&mut self) -> Result<(), InvError> {
        let Some(Source::File(file)) = self.source.clone() else {
            self.set_status_message("Optimization results are read-only");
            return Ok(());
        };
        let (Some(row), Some(cidx)) = (self.table.current_row(), self.table.current_column()) else {
            return Ok(());
        };
        let prefill = row.values()[cidx].render();
        self.edit_target = Some((file, self.table.header[cidx].clone(), row.index));
        self.enter_cmd_mode(CMDMode::EditCell, &prefill);
        Ok(())
    }

    fn apply_cell_edit(
        &mut self,
        file: &str,
        column: &str,
        row: usize,
        raw: &str,
    ) -> Result<(), InvError> {
        let stored = self.workflow.edit_cell(file, column, row, raw)?;
        self.refresh_view()?;
        self.set_status_message(format!("{column}[{}] = {stored}", row + 1));
        Ok(())
    }

    fn toggle_table_index(&mut self) -> Result<(), InvError> {
        self.table.show_index = !self.table.show_index;
        self.update_layout();
        self.update_table_data();
        Ok(())
    }

    fn set_clipboard(&mut self, content: String) -> Result<(), InvError> {
        if self.clipboard.is_none() {
            self.clipboard = Some(
                Clipboard::new().map_err(|e| InvError::Terminal(format!("clipboard: {e}")))?,
            );
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(content) {
                Ok(_) => trace!("Copied content to clipboard."),
                Err(e) => warn!("Error copying to clipboard: {:?}", e),
            }
        }
        Ok(())
    }

    fn copy_table_cell(&mut self) -> Result<(), InvError> {
        let (Some(row), Some(cidx)) = (self.table.current_row(), self.table.current_column()) else {
            return Ok(());
        };
        let cell = row.values()[cidx].render();
        trace!("Cell content: {}", cell);
        self.set_clipboard(cell)?;
        self.set_status_message("Copied cell");
        Ok(())
    }

    fn copy_table_row(&mut self) -> Result<(), InvError> {
        let row = match self.modus {
            Modus::RECORD => self.table.rows.get(self.record_view.record_idx),
            _ => self.table.current_row(),
        };
        let Some(line) = row.map(row_to_csv_line) else {
            return Ok(());
        };
        self.set_clipboard(line)?;
        self.set_status_message("Copied row as CSV");
        Ok(())
    }

    fn copy_record_cell(&mut self) -> Result<(), InvError> {
        let record = &self.record_view;
        let Some(cell) = record.row_data.get(record.curser_offset + record.curser_row).cloned()
        else {
            return Ok(());
        };
        self.set_clipboard(cell)?;
        self.set_status_message("Copied cell");
        Ok(())
    }

    fn optimize(&mut self) -> Result<(), InvError> {
        self.set_status_message("Running optimization ...");
        let fallback = self.config.fallback;
        let savings = self.workflow.run_optimization(fallback)?.summary.total_savings;
        self.sessions.remove(&Source::Results);
        self.switch_source(Some(Source::Results))?;
        if self.workflow.state().using_demo_data {
            self.set_status_message("Optimization backend unavailable, showing demo results");
        } else {
            self.set_status_message(format!("Optimization completed, total savings {savings:.2}"));
        }
        Ok(())
    }

    fn show_results(&mut self) -> Result<(), InvError> {
        if self.workflow.state().optimization_results.is_none() {
            self.set_status_message("No optimization results yet, press o to optimize");
            return Ok(());
        }
        self.switch_source(Some(Source::Results))
    }

    fn export_results(&mut self) -> Result<(), InvError> {
        let query = self
            .sessions
            .get(&Source::Results)
            .cloned()
            .unwrap_or_default();
        let path = self.workflow.export_results(&self.config.export_dir, &query)?;
        self.set_status_message(format!("Exported results to {}", path.display()));
        Ok(())
    }

    fn delete_file(&mut self) -> Result<(), InvError> {
        let Some(Source::File(name)) = self.source.clone() else {
            self.set_status_message("Select a file to remove");
            return Ok(());
        };
        self.workflow.remove_file(&name)?;
        self.sessions.remove(&Source::File(name.clone()));
        let next = self.sources().into_iter().next();
        self.switch_source(next)?;
        self.set_status_message(format!("Removed {name}"));
        Ok(())
    }

    fn select_row(&mut self, abs_row: usize) {
        let table = &mut self.table;
        if table.rows.is_empty() {
            return;
        }
        let target = std::cmp::min(abs_row, table.rows.len() - 1);
        let heigh = std::cmp::max(table.heigh, 1);
        if target < table.offset_row {
            table.offset_row = target;
        } else if target >= table.offset_row + heigh {
            table.offset_row = target + 1 - heigh;
        }
        table.curser_row = target - table.offset_row;
        self.update_table_data();
    }

    fn move_table_selection_beginning(&mut self) -> Result<(), InvError> {
        self.select_row(0);
        Ok(())
    }

    fn move_table_selection_end(&mut self) -> Result<(), InvError> {
        self.select_row(self.table.rows.len().saturating_sub(1));
        Ok(())
    }

    fn move_table_selection_up(&mut self, size: usize) -> Result<(), InvError> {
        let abs_row = self.table.offset_row + self.table.curser_row;
        self.select_row(abs_row.saturating_sub(size));
        Ok(())
    }

    fn move_table_selection_down(&mut self, size: usize) -> Result<(), InvError> {
        let abs_row = self.table.offset_row + self.table.curser_row;
        self.select_row(abs_row + size);
        Ok(())
    }

    fn move_table_selection_left(&mut self) -> Result<(), InvError> {
        let table = &mut self.table;
        if table.curser_column > 0 {
            table.curser_column -= 1;
        } else if table.offset_column > 0 {
            table.offset_column -= 1;
        }
        self.update_table_data();
        Ok(())
    }

    fn move_table_selection_right(&mut self) -> Result<(), InvError> {
        let table = &mut self.table;
        let ncolumns = table.header.len();
        if table.curser_column + table.offset_column + 1 < ncolumns {
            // Somewhere before the last column
            if table.curser_column + 1 < table.visible_columns.len() {
                table.curser_column += 1;
            } else {
                table.offset_column += 1;
            }
            self.update_table_data();
        } else if table.visible_width > table.width && table.offset_column + 1 < ncolumns {
            // At the last visible column (which could be wider then the screen)
            table.offset_column += 1;
            self.update_table_data();
        }
        Ok(())
    }

    fn build_record_view(&mut self, record_idx: usize) {
        trace!("Building record view ...");
        let record = &mut self.record_view;
        record.header_data = self
            .table
            .header
            .iter()
            .map(|name| {
                name.chars()
                    .take(self.config.max_column_width)
                    .collect::<String>()
            })
            .collect();
        record.curser_offset = 0;
        record.curser_row = 0;
        record.record_idx = record_idx;
        record.height = self.uilayout.table_height;
        record.width = self.uilayout.table_width;
        record.header_width = record
            .header_data
            .iter()
            .map(|h| h.chars().count())
            .max()
            .unwrap_or(0);
        record.row_width = record.width.saturating_sub(record.header_width + COLUMN_WIDTH_MARGIN);

        self.update_record_data();
    }

    fn update_record_data(&mut self) {
        let record = &mut self.record_view;
        record.row_data = self
            .table
            .rows
            .get(record.record_idx)
            .map(|row| row.values().iter().map(|v| v.render()).collect())
            .unwrap_or_default();

        let rbegin = std::cmp::min(record.curser_offset, record.row_data.len());
        let rend = std::cmp::min(rbegin + record.height, record.row_data.len());
        trace!(
            "Record: rIdx {}, rb {}, re {}, rows {}",
            record.record_idx,
            rbegin,
            rend,
            record.row_data.len()
        );
        record.header_view = ColumnView {
            name: "Column".to_string(),
            data: record.header_data[rbegin..rend].to_vec(),
            width: record.header_width,
        };
        record.row_view = ColumnView {
            name: "Value".to_string(),
            data: record.row_data[rbegin..rend].to_vec(),
            width: record.row_width,
        };
        self.update_uidata_for_record();
    }

    fn move_record_selection_up(&mut self, size: usize) -> Result<(), InvError> {
        let record = &mut self.record_view;
        let target = (record.curser_offset + record.curser_row).saturating_sub(size);
        if target < record.curser_offset {
            record.curser_offset = target;
        }
        record.curser_row = target - record.curser_offset;
        self.update_record_data();
        Ok(())
    }

    fn move_record_selection_down(&mut self, size: usize) -> Result<(), InvError> {
        let record = &mut self.record_view;
        if record.row_data.is_empty() {
            return Ok(());
        }
        let height = std::cmp::max(record.height, 1);
        let target = std::cmp::min(
            record.curser_offset + record.curser_row + size,
            record.row_data.len() - 1,
        );
        if target >= record.curser_offset + height {
            record.curser_offset = target + 1 - height;
        }
        record.curser_row = target - record.curser_offset;
        self.update_record_data();
        Ok(())
    }

    fn previous_record(&mut self) -> Result<(), InvError> {
        let record = &mut self.record_view;
        record.record_idx = record.record_idx.saturating_sub(1);
        self.update_record_data();
        Ok(())
    }

    fn next_record(&mut self) -> Result<(), InvError> {
        let record = &mut self.record_view;
        if record.record_idx + 1 < self.table.rows.len() {
            record.record_idx += 1;
        }
        self.update_record_data();
        Ok(())
    }
}
