use std::path::Path;

use rand::seq::SliceRandom;
use rand::thread_rng;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const WIDTH: usize = 10;
pub const HEIGHT: usize = 20;

// Cell value written by push_line; distinct from the seven piece colors.
pub const GARBAGE: u8 = 8;

const TIME_SLOW_MULTIPLIER: f64 = 0.5;
const TIME_SLOW_DURATION: f64 = 8.0;
const SHIELD_DURATION: f64 = 8.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    L,
    J,
    S,
    Z,
}

impl PieceKind {
    pub fn all() -> [PieceKind; 7] {
        [
            PieceKind::I,
            PieceKind::O,
            PieceKind::T,
            PieceKind::L,
            PieceKind::J,
            PieceKind::S,
            PieceKind::Z,
        ]
    }

    pub fn color_id(self) -> u8 {
        match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::L => 4,
            PieceKind::J => 5,
            PieceKind::S => 6,
            PieceKind::Z => 7,
        }
    }
}

// Occupancy matrix for one rotation state. Shapes are at most 4x4; `size` is
// the live n x n window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    size: usize,
    cells: [[u8; 4]; 4],
}

impl Shape {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn at(&self, row: usize, col: usize) -> u8 {
        self.cells[row][col]
    }
}

fn base_shape(kind: PieceKind) -> Shape {
    match kind {
        PieceKind::I => Shape {
            size: 4,
            cells: [
                [0, 0, 0, 0],
                [1, 1, 1, 1],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::O => Shape {
            size: 2,
            cells: [
                [1, 1, 0, 0],
                [1, 1, 0, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::T => Shape {
            size: 3,
            cells: [
                [0, 1, 0, 0],
                [1, 1, 1, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::L => Shape {
            size: 3,
            cells: [
                [0, 0, 1, 0],
                [1, 1, 1, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::J => Shape {
            size: 3,
            cells: [
                [1, 0, 0, 0],
                [1, 1, 1, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::S => Shape {
            size: 3,
            cells: [
                [0, 1, 1, 0],
                [1, 1, 0, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
        PieceKind::Z => Shape {
            size: 3,
            cells: [
                [1, 1, 0, 0],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        },
    }
}

fn rotate_cw(shape: &Shape) -> Shape {
    let n = shape.size;
    let mut cells = [[0u8; 4]; 4];
    for r in 0..n {
        for c in 0..n {
            cells[c][n - 1 - r] = shape.cells[r][c];
        }
    }
    Shape { size: n, cells }
}

fn rotate_ccw(shape: &Shape) -> Shape {
    let n = shape.size;
    let mut cells = [[0u8; 4]; 4];
    for r in 0..n {
        for c in 0..n {
            cells[n - 1 - c][r] = shape.cells[r][c];
        }
    }
    Shape { size: n, cells }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Piece {
    kind: PieceKind,
    rotation: u8,
    shape: Shape,
}

impl Piece {
    pub fn new(kind: PieceKind) -> Self {
        Self {
            kind,
            rotation: 0,
            shape: base_shape(kind),
        }
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn rotation(&self) -> u8 {
        self.rotation
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rotate(&mut self) {
        self.rotation = (self.rotation + 1) % 4;
        self.shape = rotate_cw(&self.shape);
    }

    pub fn rotate_counter_clockwise(&mut self) {
        self.rotation = (self.rotation + 3) % 4;
        self.shape = rotate_ccw(&self.shape);
    }

    // One clockwise step ahead of self, for collision pre-checks.
    pub fn rotated_copy(&self) -> Piece {
        let mut copy = *self;
        copy.rotate();
        copy
    }
}

// Every kind is drawn exactly once per shuffled cycle before any repeats.
pub struct PieceBag {
    bag: Vec<PieceKind>,
    index: usize,
}

impl PieceBag {
    pub fn new() -> Self {
        let mut bag = Self {
            bag: Vec::new(),
            index: 0,
        };
        bag.refill();
        bag
    }

    fn refill(&mut self) {
        self.bag.clear();
        self.bag.extend(PieceKind::all());
        self.bag.shuffle(&mut thread_rng());
        self.index = 0;
    }

    pub fn next(&mut self) -> Piece {
        if self.index >= self.bag.len() {
            self.refill();
        }
        let kind = self.bag[self.index];
        self.index += 1;
        Piece::new(kind)
    }

    pub fn peek(&mut self) -> Piece {
        if self.index >= self.bag.len() {
            self.refill();
        }
        Piece::new(self.bag[self.index])
    }

    pub fn reset(&mut self) {
        self.refill();
    }
}

impl Default for PieceBag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    grid: [[u8; WIDTH]; HEIGHT],
    lines_cleared: u32,
}

impl Board {
    pub fn new() -> Self {
        Self {
            grid: [[0; WIDTH]; HEIGHT],
            lines_cleared: 0,
        }
    }

    pub fn is_valid_position(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < WIDTH as i32 && y >= 0 && y < HEIGHT as i32
    }

    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        if !self.is_valid_position(x, y) {
            return true; // out of bounds collides
        }
        self.grid[y as usize][x as usize] != 0
    }

    pub fn can_place(&self, piece: &Piece, x: i32, y: i32) -> bool {
        let shape = piece.shape();
        for row in 0..shape.size() {
            for col in 0..shape.size() {
                if shape.at(row, col) != 0 && self.is_occupied(x + col as i32, y + row as i32) {
                    return false;
                }
            }
        }
        true
    }

    // Writes unconditionally; callers validate with can_place first.
    pub fn place(&mut self, piece: &Piece, x: i32, y: i32) {
        let shape = piece.shape();
        let color = piece.kind().color_id();
        for row in 0..shape.size() {
            for col in 0..shape.size() {
                if shape.at(row, col) != 0 {
                    let bx = x + col as i32;
                    let by = y + row as i32;
                    if self.is_valid_position(bx, by) {
                        self.grid[by as usize][bx as usize] = color;
                    }
                }
            }
        }
    }

    pub fn clear_lines(&mut self) -> u32 {
        // Collect first; shifting while scanning would corrupt multi-row clears.
        let full: Vec<usize> = (0..HEIGHT)
            .filter(|&y| self.grid[y].iter().all(|&c| c != 0))
            .collect();
        for &line in &full {
            for y in (1..=line).rev() {
                self.grid[y] = self.grid[y - 1];
            }
            self.grid[0] = [0; WIDTH];
        }
        self.lines_cleared += full.len() as u32;
        full.len() as u32
    }

    // Shifts the whole stack up one row and synthesizes a bottom row that is
    // full except for a single random escape column.
    pub fn push_line(&mut self) {
        for y in 0..HEIGHT - 1 {
            self.grid[y] = self.grid[y + 1];
        }
        let hole = thread_rng().gen_range(0..WIDTH);
        let mut row = [GARBAGE; WIDTH];
        row[hole] = 0;
        self.grid[HEIGHT - 1] = row;
    }

    pub fn remove_top_two_complete_lines(&mut self) {
        for _ in 0..2 {
            let line = (0..HEIGHT)
                .find(|&y| self.grid[y].iter().all(|&c| c != 0))
                .or_else(|| (0..HEIGHT).find(|&y| self.grid[y].iter().any(|&c| c != 0)));
            let Some(line) = line else {
                break;
            };
            for y in (1..=line).rev() {
                self.grid[y] = self.grid[y - 1];
            }
            self.grid[0] = [0; WIDTH];
        }
    }

    pub fn remove_bottom_complete_line(&mut self) {
        let line = (0..HEIGHT)
            .rev()
            .find(|&y| self.grid[y].iter().all(|&c| c != 0))
            .or_else(|| {
                (0..HEIGHT)
                    .rev()
                    .find(|&y| self.grid[y].iter().any(|&c| c != 0))
            });
        let Some(line) = line else {
            return;
        };
        for y in line..HEIGHT - 1 {
            self.grid[y] = self.grid[y + 1];
        }
        self.grid[HEIGHT - 1] = [0; WIDTH];
    }

    pub fn column_height(&self, x: usize) -> u32 {
        for y in 0..HEIGHT {
            if self.grid[y][x] != 0 {
                return (HEIGHT - y) as u32;
            }
        }
        0
    }

    pub fn aggregate_height(&self) -> f64 {
        (0..WIDTH).map(|x| self.column_height(x) as f64).sum()
    }

    pub fn holes(&self) -> u32 {
        let mut holes = 0;
        for x in 0..WIDTH {
            let mut found_block = false;
            for y in 0..HEIGHT {
                if self.grid[y][x] != 0 {
                    found_block = true;
                } else if found_block {
                    holes += 1;
                }
            }
        }
        holes
    }

    pub fn bumpiness(&self) -> f64 {
        (0..WIDTH - 1)
            .map(|x| (self.column_height(x) as f64 - self.column_height(x + 1) as f64).abs())
            .sum()
    }

    pub fn is_game_over(&self) -> bool {
        self.grid[0].iter().any(|&c| c != 0)
    }

    pub fn grid(&self) -> &[[u8; WIDTH]; HEIGHT] {
        &self.grid
    }

    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    pub fn clear(&mut self) {
        self.grid = [[0; WIDTH]; HEIGHT];
        self.lines_cleared = 0;
    }

    // Deep copy, cleared-line counter included; search exploration must never
    // touch the live board.
    pub fn copy(&self) -> Board {
        self.clone()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    LinesCleared(u32),
    ScoreChanged(u32),
    GameOver,
}

pub struct GameEngine {
    board: Board,
    bag: PieceBag,
    current: Option<Piece>,
    next: Option<Piece>,
    x: i32,
    y: i32,
    score: u32,
    level: u32,
    lines: u32,
    fall_speed: f64, // rows per second
    fall_timer: f64,
    paused: bool,
    game_over: bool,
    time_slow_multiplier: f64,
    pieces_spawned: u64,
    events: Vec<EngineEvent>,
}

impl GameEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            board: Board::new(),
            bag: PieceBag::new(),
            current: None,
            next: None,
            x: 0,
            y: 0,
            score: 0,
            level: 1,
            lines: 0,
            fall_speed: 1.0,
            fall_timer: 0.0,
            paused: false,
            game_over: false,
            time_slow_multiplier: 1.0,
            pieces_spawned: 0,
            events: Vec::new(),
        };
        engine.spawn_next_piece();
        engine
    }

    pub fn update(&mut self, dt: f64) {
        if self.paused || self.game_over {
            return;
        }
        let effective = dt * self.time_slow_multiplier;
        self.fall_timer += effective;
        let time_per_row = 1.0 / self.fall_speed;
        if self.fall_timer >= time_per_row {
            self.fall_timer = 0.0;
            if !self.move_piece(0, 1) {
                self.lock_piece();
            }
        }
    }

    pub fn move_piece(&mut self, dx: i32, dy: i32) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let nx = self.x + dx;
        let ny = self.y + dy;
        if self.board.can_place(&current, nx, ny) {
            self.x = nx;
            self.y = ny;
            return true;
        }
        false
    }

    // In-place rotation, then one-column kicks left and right.
    pub fn rotate_piece(&mut self) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let rotated = current.rotated_copy();
        if self.board.can_place(&rotated, self.x, self.y) {
            self.current = Some(rotated);
            return true;
        }
        if self.board.can_place(&rotated, self.x - 1, self.y) {
            self.current = Some(rotated);
            self.x -= 1;
            return true;
        }
        if self.board.can_place(&rotated, self.x + 1, self.y) {
            self.current = Some(rotated);
            self.x += 1;
            return true;
        }
        false
    }

    pub fn hard_drop(&mut self) {
        if self.current.is_none() {
            return;
        }
        while self.move_piece(0, 1) {
            self.score += 2;
        }
        self.lock_piece();
    }

    fn lock_piece(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        self.board.place(&current, self.x, self.y);

        let cleared = self.board.clear_lines();
        if cleared > 0 {
            self.lines += cleared;
            self.update_score(cleared);
            self.update_level();
            self.events.push(EngineEvent::LinesCleared(cleared));
        }

        if self.board.is_game_over() {
            self.game_over = true;
            self.events.push(EngineEvent::GameOver);
            log::info!("game over, final score {}", self.score);
        } else {
            self.spawn_next_piece();
        }
    }

    fn spawn_next_piece(&mut self) {
        self.current = Some(self.next.take().unwrap_or_else(|| self.bag.next()));
        self.next = Some(self.bag.next());
        self.x = WIDTH as i32 / 2 - 1;
        self.y = 0;
        self.pieces_spawned += 1;

        let Some(current) = self.current else {
            return;
        };
        if !self.board.can_place(&current, self.x, self.y) {
            self.game_over = true;
            self.events.push(EngineEvent::GameOver);
        }
    }

    fn update_score(&mut self, cleared: u32) {
        const POINTS: [u32; 5] = [0, 100, 300, 500, 800];
        let earned = POINTS[cleared.min(4) as usize];
        self.score += earned * self.level;
        self.events.push(EngineEvent::ScoreChanged(self.score));
    }

    fn update_level(&mut self) {
        let new_level = self.lines / 10 + 1;
        if new_level > self.level {
            self.level = new_level;
            self.fall_speed = 0.8 + (self.level - 1) as f64 * 0.15;
            log::info!("level up to {} (fall speed {:.2})", self.level, self.fall_speed);
        }
    }

    // Exchanges current and lookahead; rolls back pieces and position when the
    // swapped-in piece cannot occupy the spawn cell.
    pub fn swap_pieces(&mut self) {
        let (Some(current), Some(next)) = (self.current, self.next) else {
            return;
        };
        let old_x = self.x;
        let old_y = self.y;
        self.current = Some(next);
        self.next = Some(current);
        self.x = WIDTH as i32 / 2 - 1;
        self.y = 0;
        if !self.board.can_place(&next, self.x, self.y) {
            self.current = Some(current);
            self.next = Some(next);
            self.x = old_x;
            self.y = old_y;
        }
    }

    // Duration bookkeeping belongs to the casting spell's deadline.
    pub fn apply_time_slow(&mut self, multiplier: f64) {
        self.time_slow_multiplier = multiplier;
    }

    pub fn remove_time_slow(&mut self) {
        self.time_slow_multiplier = 1.0;
    }

    pub fn force_next_piece(&mut self) {
        self.spawn_next_piece();
    }

    pub fn reset(&mut self) {
        self.board.clear();
        self.bag.reset();
        self.current = None;
        self.next = None;
        self.score = 0;
        self.level = 1;
        self.lines = 0;
        self.fall_speed = 1.0;
        self.fall_timer = 0.0;
        self.paused = false;
        self.game_over = false;
        self.time_slow_multiplier = 1.0;
        self.pieces_spawned = 0;
        self.events.clear();
        self.spawn_next_piece();
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn current_piece(&self) -> Option<Piece> {
        self.current
    }

    pub fn next_piece(&self) -> Option<Piece> {
        self.next
    }

    pub fn current_x(&self) -> i32 {
        self.x
    }

    pub fn current_y(&self) -> i32 {
        self.y
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn fall_speed(&self) -> f64 {
        self.fall_speed
    }

    pub fn time_slow_multiplier(&self) -> f64 {
        self.time_slow_multiplier
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn pieces_spawned(&self) -> u64 {
        self.pieces_spawned
    }
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum SpellKind {
    PushLine,
    TimeSlow,
    PieceSwap,
    Bomb,
    Shield,
}

impl SpellKind {
    pub fn all() -> [SpellKind; 5] {
        [
            SpellKind::PushLine,
            SpellKind::TimeSlow,
            SpellKind::PieceSwap,
            SpellKind::Bomb,
            SpellKind::Shield,
        ]
    }

    pub fn id(self) -> &'static str {
        match self {
            SpellKind::PushLine => "PushLine",
            SpellKind::TimeSlow => "TimeSlow",
            SpellKind::PieceSwap => "PieceSwap",
            SpellKind::Bomb => "Bomb",
            SpellKind::Shield => "Shield",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SpellKind::PushLine => "Push Line",
            SpellKind::TimeSlow => "Time Slow",
            SpellKind::PieceSwap => "Piece Swap",
            SpellKind::Bomb => "Bomb",
            SpellKind::Shield => "Shield",
        }
    }

    pub fn parse(id: &str) -> Option<SpellKind> {
        match id {
            "PushLine" => Some(SpellKind::PushLine),
            "TimeSlow" => Some(SpellKind::TimeSlow),
            "PieceSwap" => Some(SpellKind::PieceSwap),
            "Bomb" => Some(SpellKind::Bomb),
            "Shield" => Some(SpellKind::Shield),
            _ => None,
        }
    }

    pub fn requires_target(self) -> bool {
        matches!(
            self,
            SpellKind::PushLine | SpellKind::TimeSlow | SpellKind::Bomb
        )
    }

    fn active_duration(self) -> Option<f64> {
        match self {
            SpellKind::TimeSlow => Some(TIME_SLOW_DURATION),
            SpellKind::Shield => Some(SHIELD_DURATION),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Spell {
    kind: SpellKind,
    mana_cost: u32,
    cooldown_seconds: f64,
    remaining_cooldown: f64,
    active: bool,
    active_remaining: f64,
}

impl Spell {
    pub fn new(kind: SpellKind, mana_cost: u32, cooldown_seconds: f64) -> Self {
        Self {
            kind,
            mana_cost,
            cooldown_seconds,
            remaining_cooldown: 0.0,
            active: false,
            active_remaining: 0.0,
        }
    }

    pub fn kind(&self) -> SpellKind {
        self.kind
    }

    pub fn mana_cost(&self) -> u32 {
        self.mana_cost
    }

    pub fn cooldown_seconds(&self) -> f64 {
        self.cooldown_seconds
    }

    pub fn remaining_cooldown(&self) -> f64 {
        self.remaining_cooldown
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn can_cast(&self, mana: u32) -> bool {
        self.remaining_cooldown <= 0.0 && mana >= self.mana_cost && !self.active
    }

    pub fn cast(&mut self, target: Option<&mut GameEngine>, caster: Option<&mut GameEngine>) {
        match self.kind {
            SpellKind::PushLine => {
                let Some(target) = target else {
                    return;
                };
                target.board_mut().push_line();
            }
            SpellKind::TimeSlow => {
                let Some(target) = target else {
                    return;
                };
                target.apply_time_slow(TIME_SLOW_MULTIPLIER);
                self.activate();
            }
            SpellKind::PieceSwap => {
                let Some(caster) = caster else {
                    return;
                };
                caster.swap_pieces();
            }
            SpellKind::Bomb => {
                let Some(target) = target else {
                    return;
                };
                target.board_mut().remove_top_two_complete_lines();
            }
            SpellKind::Shield => {
                let Some(caster) = caster else {
                    return;
                };
                caster.board_mut().remove_bottom_complete_line();
                self.activate();
            }
        }
        self.start_cooldown();
    }

    fn activate(&mut self) {
        if let Some(duration) = self.kind.active_duration() {
            self.active = true;
            self.active_remaining = duration;
        }
    }

    fn start_cooldown(&mut self) {
        self.remaining_cooldown = self.cooldown_seconds;
    }

    // Cooldown decay and the active-duration deadline run in the same tick;
    // returns true exactly once, on the tick the active state expires.
    pub fn update(&mut self, dt: f64) -> bool {
        if self.remaining_cooldown > 0.0 {
            self.remaining_cooldown -= dt;
            if self.remaining_cooldown < 0.0 {
                self.remaining_cooldown = 0.0;
            }
        }
        if self.active {
            self.active_remaining -= dt;
            if self.active_remaining <= 0.0 {
                self.active = false;
                self.active_remaining = 0.0;
                return true;
            }
        }
        false
    }

    pub fn reset(&mut self) {
        self.remaining_cooldown = 0.0;
        self.active = false;
        self.active_remaining = 0.0;
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpellParams {
    pub cost: u32,
    pub cooldown: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SpellTable {
    pub push_line: SpellParams,
    pub time_slow: SpellParams,
    pub piece_swap: SpellParams,
    pub bomb: SpellParams,
    pub shield: SpellParams,
}

impl SpellTable {
    pub fn params(&self, kind: SpellKind) -> SpellParams {
        match kind {
            SpellKind::PushLine => self.push_line,
            SpellKind::TimeSlow => self.time_slow,
            SpellKind::PieceSwap => self.piece_swap,
            SpellKind::Bomb => self.bomb,
            SpellKind::Shield => self.shield,
        }
    }
}

impl Default for SpellTable {
    fn default() -> Self {
        Self {
            push_line: SpellParams {
                cost: 20,
                cooldown: 6.0,
            },
            time_slow: SpellParams {
                cost: 30,
                cooldown: 12.0,
            },
            piece_swap: SpellParams {
                cost: 25,
                cooldown: 10.0,
            },
            bomb: SpellParams {
                cost: 40,
                cooldown: 18.0,
            },
            shield: SpellParams {
                cost: 35,
                cooldown: 20.0,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AiWeights {
    pub height: f64,
    pub holes: f64,
    pub bumpiness: f64,
    pub lines: f64,
}

impl Default for AiWeights {
    fn default() -> Self {
        Self {
            height: 0.5,
            holes: 0.7,
            bumpiness: 0.3,
            lines: -1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub mana_per_line: u32,
    pub max_mana: u32,
    pub spells: SpellTable,
    pub ai_weights: AiWeights,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mana_per_line: 10,
            max_mana: 100,
            spells: SpellTable::default(),
            ai_weights: AiWeights::default(),
        }
    }
}

impl GameConfig {
    // A missing or malformed file is not fatal; the defaults carry the match.
    pub fn load(path: &Path) -> GameConfig {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("invalid config {}: {err}, using defaults", path.display());
                    GameConfig::default()
                }
            },
            Err(err) => {
                log::warn!("could not read config {}: {err}, using defaults", path.display());
                GameConfig::default()
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlayerTick {
    pub events: Vec<EngineEvent>,
    pub slow_expired: bool,
}

pub struct Player {
    id: String,
    name: String,
    engine: GameEngine,
    mana: u32,
    max_mana: u32,
    mana_per_line: u32,
    spells: Vec<Spell>,
    is_shielded: bool,
}

impl Player {
    pub fn new(id: &str, name: &str, config: &GameConfig) -> Self {
        let spells = SpellKind::all()
            .iter()
            .map(|&kind| {
                let params = config.spells.params(kind);
                Spell::new(kind, params.cost, params.cooldown)
            })
            .collect();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            engine: GameEngine::new(),
            mana: 0,
            max_mana: config.max_mana,
            mana_per_line: config.mana_per_line,
            spells,
            is_shielded: false,
        }
    }

    pub fn add_mana(&mut self, amount: u32) {
        self.mana = (self.mana + amount).min(self.max_mana);
    }

    // A failed cast, for any reason, spends no mana and starts no cooldown.
    pub fn cast_spell(&mut self, kind: SpellKind, target: Option<&mut Player>) -> bool {
        let Some(idx) = self.spells.iter().position(|s| s.kind() == kind) else {
            return false;
        };
        if kind.requires_target() && target.is_none() {
            return false;
        }
        if let Some(target) = target.as_deref() {
            if target.is_shielded
                && target
                    .spell(SpellKind::Shield)
                    .is_some_and(|s| s.is_active())
            {
                return false;
            }
        }
        if !self.spells[idx].can_cast(self.mana) {
            return false;
        }
        let target_engine = target.map(|p| &mut p.engine);
        self.spells[idx].cast(target_engine, Some(&mut self.engine));
        self.mana -= self.spells[idx].mana_cost();
        log::debug!("{} cast {}", self.id, kind.id());
        true
    }

    pub fn cast_spell_by_id(&mut self, id: &str, target: Option<&mut Player>) -> bool {
        let Some(kind) = SpellKind::parse(id) else {
            return false;
        };
        self.cast_spell(kind, target)
    }

    pub fn update(&mut self, dt: f64) -> PlayerTick {
        // Pause suspends every timer, spell cooldowns and durations included.
        if self.engine.is_paused() {
            return PlayerTick::default();
        }
        self.engine.update(dt);
        let events = self.engine.take_events();
        for event in &events {
            if matches!(event, EngineEvent::LinesCleared(_)) {
                self.add_mana(self.mana_per_line);
            }
        }
        let mut slow_expired = false;
        for spell in &mut self.spells {
            if spell.update(dt) && spell.kind() == SpellKind::TimeSlow {
                slow_expired = true;
            }
        }
        self.is_shielded = self
            .spell(SpellKind::Shield)
            .is_some_and(|s| s.is_active());
        PlayerTick {
            events,
            slow_expired,
        }
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.mana = 0;
        self.is_shielded = false;
        for spell in &mut self.spells {
            spell.reset();
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GameEngine {
        &mut self.engine
    }

    pub fn mana(&self) -> u32 {
        self.mana
    }

    pub fn max_mana(&self) -> u32 {
        self.max_mana
    }

    pub fn is_shielded(&self) -> bool {
        self.is_shielded
    }

    pub fn spell(&self, kind: SpellKind) -> Option<&Spell> {
        self.spells.iter().find(|s| s.kind() == kind)
    }

    pub fn spells(&self) -> &[Spell] {
        &self.spells
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AiMove {
    pub x: i32,
    pub rotation: u8,
    pub score: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct AiController {
    weights: AiWeights,
}

impl AiController {
    pub fn new(weights: AiWeights) -> Self {
        Self { weights }
    }

    // Exhaustive over 4 rotations x horizontal offsets, including off-board
    // trial columns that placement validity rejects. Lowest score wins; ties
    // keep the first candidate in enumeration order.
    pub fn decide_best_move(&self, board: &Board, piece: &Piece) -> AiMove {
        let mut best: Option<AiMove> = None;
        for rotation in 0..4u8 {
            let mut test = *piece;
            for _ in 0..rotation {
                test.rotate();
            }
            for x in -2..WIDTH as i32 + 2 {
                let Some(y) = find_drop_y(board, &test, x) else {
                    continue;
                };
                let mut trial = board.copy();
                trial.place(&test, x, y);
                let score = self.evaluate(&trial);
                if best.is_none_or(|b| score < b.score) {
                    best = Some(AiMove { x, rotation, score });
                }
            }
        }
        best.unwrap_or(AiMove {
            x: WIDTH as i32 / 2,
            rotation: 0,
            score: 0.0,
        })
    }

    fn evaluate(&self, board: &Board) -> f64 {
        self.weights.height * board.aggregate_height()
            + self.weights.holes * board.holes() as f64
            + self.weights.bumpiness * board.bumpiness()
            + self.weights.lines * board.lines_cleared() as f64
    }

    pub fn play_move(engine: &mut GameEngine, mv: &AiMove) {
        for _ in 0..mv.rotation {
            engine.rotate_piece();
        }
        loop {
            let dx = mv.x - engine.current_x();
            if dx == 0 {
                break;
            }
            if !engine.move_piece(dx.signum(), 0) {
                break;
            }
        }
        engine.hard_drop();
    }

    // Fixed priority order; the first cast that lands ends the decision.
    pub fn decide_spell(
        &self,
        caster: &mut Player,
        opponent: Option<&mut Player>,
    ) -> Option<SpellKind> {
        let opponent = opponent?;
        if opponent.engine().board().aggregate_height() > HEIGHT as f64 * 0.7
            && caster.cast_spell(SpellKind::PushLine, Some(&mut *opponent))
        {
            return Some(SpellKind::PushLine);
        }
        if caster.engine().board().aggregate_height() > HEIGHT as f64 * 0.6
            && caster.cast_spell(SpellKind::Shield, None)
        {
            return Some(SpellKind::Shield);
        }
        if opponent.engine().board().lines_cleared() > caster.engine().board().lines_cleared() + 5
            && caster.cast_spell(SpellKind::TimeSlow, Some(&mut *opponent))
        {
            return Some(SpellKind::TimeSlow);
        }
        if caster.engine().board().holes() > 5
            && caster.cast_spell(SpellKind::Bomb, Some(&mut *opponent))
        {
            return Some(SpellKind::Bomb);
        }
        None
    }
}

fn find_drop_y(board: &Board, piece: &Piece, x: i32) -> Option<i32> {
    let mut y = 0;
    while board.can_place(piece, x, y + 1) {
        y += 1;
    }
    if board.can_place(piece, x, y) {
        Some(y)
    } else {
        None
    }
}

// Two competitors advanced by one external tick driver. All cross-engine
// mutation (spell casts, TimeSlow expiry) happens at the tick boundary.
pub struct Duel {
    players: [Player; 2],
    ai: [Option<AiController>; 2],
    acted_piece: [u64; 2],
}

impl Duel {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            players: [
                Player::new("p1", "Player 1", config),
                Player::new("p2", "Player 2", config),
            ],
            ai: [None, None],
            acted_piece: [0; 2],
        }
    }

    pub fn set_ai(&mut self, idx: usize, controller: Option<AiController>) {
        self.ai[idx] = controller;
    }

    pub fn tick(&mut self, dt: f64) -> [PlayerTick; 2] {
        let reports = [self.players[0].update(dt), self.players[1].update(dt)];
        for idx in 0..2 {
            if reports[idx].slow_expired {
                self.players[1 - idx].engine_mut().remove_time_slow();
            }
        }
        for idx in 0..2 {
            self.drive_ai(idx);
        }
        reports
    }

    fn drive_ai(&mut self, idx: usize) {
        let Some(ai) = self.ai[idx] else {
            return;
        };
        if self.players[idx].engine().is_game_over() || self.players[idx].engine().is_paused() {
            return;
        }
        let spawned = self.players[idx].engine().pieces_spawned();
        if spawned == self.acted_piece[idx] {
            return;
        }
        self.acted_piece[idx] = spawned;

        // Search runs on a board snapshot; the move is applied through the
        // public engine calls.
        let mv = {
            let engine = self.players[idx].engine();
            engine
                .current_piece()
                .map(|piece| ai.decide_best_move(engine.board(), &piece))
        };
        if let Some(mv) = mv {
            AiController::play_move(self.players[idx].engine_mut(), &mv);
        }

        let (caster, opponent) = self.split_pair(idx);
        ai.decide_spell(caster, Some(opponent));
    }

    fn split_pair(&mut self, idx: usize) -> (&mut Player, &mut Player) {
        let (a, b) = self.players.split_at_mut(1);
        if idx == 0 {
            (&mut a[0], &mut b[0])
        } else {
            (&mut b[0], &mut a[0])
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        for player in &mut self.players {
            player.engine_mut().set_paused(paused);
        }
    }

    pub fn reset(&mut self) {
        for player in &mut self.players {
            player.reset();
        }
        self.acted_piece = [0; 2];
    }

    pub fn is_over(&self) -> bool {
        self.players.iter().any(|p| p.engine().is_game_over())
    }

    pub fn players(&self) -> &[Player; 2] {
        &self.players
    }

    pub fn player(&self, idx: usize) -> &Player {
        &self.players[idx]
    }

    pub fn player_mut(&mut self, idx: usize) -> &mut Player {
        &mut self.players[idx]
    }
}

pub const MSG_CONNECT: &str = "CONNECT";
pub const MSG_STATE_UPDATE: &str = "STATE_UPDATE";
pub const MSG_SPELL_CAST: &str = "SPELL_CAST";
pub const MSG_PING: &str = "PING";
pub const MSG_DISCONNECT: &str = "DISCONNECT";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub player_id: String,
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectData {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellCastData {
    pub spell_id: String,
    pub target: String,
    pub mana_cost: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceSnapshot {
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub x: i32,
    pub y: i32,
    pub rotation: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub grid: Vec<Vec<u8>>,
    pub height: f64,
    pub holes: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub score: u32,
    pub lines: u32,
    pub level: u32,
    pub board: BoardSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_piece: Option<PieceSnapshot>,
}

impl StateSnapshot {
    pub fn capture(engine: &GameEngine) -> Self {
        let board = engine.board();
        Self {
            score: engine.score(),
            lines: engine.lines(),
            level: engine.level(),
            board: BoardSnapshot {
                grid: board.grid().iter().map(|row| row.to_vec()).collect(),
                height: board.aggregate_height(),
                holes: board.holes(),
            },
            current_piece: engine.current_piece().map(|piece| PieceSnapshot {
                kind: piece.kind(),
                x: engine.current_x(),
                y: engine.current_y(),
                rotation: piece.rotation(),
            }),
        }
    }
}

impl NetMessage {
    fn with_data<T: Serialize>(kind: &str, player_id: &str, data: &T) -> Self {
        Self {
            kind: kind.to_string(),
            player_id: player_id.to_string(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn connect(player_id: &str, player_name: &str) -> Self {
        Self::with_data(
            MSG_CONNECT,
            player_id,
            &ConnectData {
                name: player_name.to_string(),
            },
        )
    }

    pub fn state_update(player_id: &str, engine: &GameEngine) -> Self {
        Self::with_data(MSG_STATE_UPDATE, player_id, &StateSnapshot::capture(engine))
    }

    pub fn spell_cast(player_id: &str, spell: SpellKind, target_id: &str, mana_cost: u32) -> Self {
        Self::with_data(
            MSG_SPELL_CAST,
            player_id,
            &SpellCastData {
                spell_id: spell.id().to_string(),
                target: target_id.to_string(),
                mana_cost,
            },
        )
    }

    pub fn ping(player_id: &str) -> Self {
        Self {
            kind: MSG_PING.to_string(),
            player_id: player_id.to_string(),
            data: serde_json::Value::Null,
        }
    }

    pub fn disconnect(player_id: &str) -> Self {
        Self {
            kind: MSG_DISCONNECT.to_string(),
            player_id: player_id.to_string(),
            data: serde_json::Value::Null,
        }
    }
}
