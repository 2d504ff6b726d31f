//! Bitboard rules engine with a time-bounded alpha-beta search.

use super::board::Board;
use super::position::{AiMove, MoveMask, Position};
use super::rules::{EngineError, RulesEngine};
use super::types::{Color, GameResult};
use crate::config::StrengthLevel;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const NOT_A_FILE: u64 = 0xfefe_fefe_fefe_fefe;
const NOT_H_FILE: u64 = 0x7f7f_7f7f_7f7f_7f7f;
const CORNERS: u64 = (1 << 0) | (1 << 7) | (1 << 56) | (1 << 63);

const WIN_SCORE: i32 = 10_000;
const CORNER_WEIGHT: i32 = 25;
const MOBILITY_WEIGHT: i32 = 2;

/// The eight compass directions as bitboard shifts.
#[derive(Debug, Clone, Copy, strum::EnumIter)]
enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    /// Moves every set bit one step, dropping bits that would wrap a file.
    fn shift(self, bits: u64) -> u64 {
        match self {
            Direction::North => bits >> 8,
            Direction::South => bits << 8,
            Direction::East => (bits << 1) & NOT_A_FILE,
            Direction::West => (bits >> 1) & NOT_H_FILE,
            Direction::NorthEast => (bits >> 7) & NOT_A_FILE,
            Direction::NorthWest => (bits >> 9) & NOT_H_FILE,
            Direction::SouthEast => (bits << 9) & NOT_A_FILE,
            Direction::SouthWest => (bits << 7) & NOT_H_FILE,
        }
    }
}

fn directions() -> impl Iterator<Item = Direction> {
    <Direction as strum::IntoEnumIterator>::iter()
}

/// Legal-move mask for the side owning `mine`.
fn legal_bits(mine: u64, theirs: u64) -> u64 {
    let empty = !(mine | theirs);
    let mut moves = 0;
    for dir in directions() {
        let mut run = dir.shift(mine) & theirs;
        for _ in 0..5 {
            run |= dir.shift(run) & theirs;
        }
        moves |= dir.shift(run) & empty;
    }
    moves
}

/// Opponent stones flipped by placing at `pos`.
fn flip_bits(mine: u64, theirs: u64, pos: Position) -> u64 {
    let mut flips = 0;
    for dir in directions() {
        let mut run = 0;
        let mut cursor = dir.shift(pos.bit());
        while cursor & theirs != 0 {
            run |= cursor;
            cursor = dir.shift(cursor);
        }
        if cursor & mine != 0 {
            flips |= run;
        }
    }
    flips
}

fn sides(board: &Board, color: Color) -> (u64, u64) {
    (board.stones(color), board.stones(color.opponent()))
}

/// Reference rules engine for standard 8x8 reversi.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitboardEngine;

impl BitboardEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }
}

impl RulesEngine for BitboardEngine {
    fn valid_moves(&self, board: &Board, color: Color) -> Result<MoveMask, EngineError> {
        let (mine, theirs) = sides(board, color);
        Ok(MoveMask::from_bits(legal_bits(mine, theirs)))
    }

    #[instrument(skip_all, fields(position = %pos, color = %color))]
    fn apply_move(&self, board: &Board, pos: Position, color: Color) -> Result<Board, EngineError> {
        let (mine, theirs) = sides(board, color);
        if board.occupied() & pos.bit() != 0 {
            return Err(EngineError::new(format!("Cell {} is occupied", pos)));
        }
        let flips = flip_bits(mine, theirs, pos);
        if flips == 0 {
            return Err(EngineError::new(format!(
                "Cell {} flips nothing for {}",
                pos, color
            )));
        }
        Ok(board.with_move(pos, color, flips))
    }

    fn result(&self, board: &Board) -> Result<GameResult, EngineError> {
        let black = board.stones(Color::Black);
        let white = board.stones(Color::White);
        if legal_bits(black, white) != 0 || legal_bits(white, black) != 0 {
            return Ok(GameResult::Ongoing);
        }
        let counts = board.stone_counts();
        Ok(match counts.black.cmp(&counts.white) {
            std::cmp::Ordering::Greater => GameResult::BlackWin,
            std::cmp::Ordering::Less => GameResult::WhiteWin,
            std::cmp::Ordering::Equal => GameResult::Draw,
        })
    }

    #[instrument(
        skip_all,
        fields(color = %color, budget_ms = budget.as_millis() as u64, strength = strength.get())
    )]
    fn choose_move(
        &self,
        board: &Board,
        color: Color,
        budget: Duration,
        strength: StrengthLevel,
    ) -> Result<AiMove, EngineError> {
        let (mine, theirs) = sides(board, color);
        let moves = MoveMask::from_bits(legal_bits(mine, theirs));
        if moves.is_empty() {
            debug!("No legal move, answering pass");
            return Ok(AiMove::Pass);
        }

        let mut search = Search::new(Instant::now() + budget);
        let mut best = None;
        for depth in 1..=strength.get() {
            // The shallowest search always finishes so a move is always found.
            search.enforce_deadline = depth > 1;
            match search.root(mine, theirs, moves, depth) {
                Some((pos, score)) => {
                    debug!(depth, position = %pos, score, nodes = search.nodes, "Depth completed");
                    best = Some(pos);
                }
                None => {
                    debug!(depth, nodes = search.nodes, "Thinking time exhausted");
                    break;
                }
            }
        }

        best.map(AiMove::Play)
            .ok_or_else(|| EngineError::new("Search produced no move"))
    }
}

/// Negamax state for one `choose_move` call.
struct Search {
    deadline: Instant,
    enforce_deadline: bool,
    aborted: bool,
    nodes: u64,
}

impl Search {
    fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            enforce_deadline: false,
            aborted: false,
            nodes: 0,
        }
    }

    /// Best root move at `depth`, or `None` if the deadline interrupted it.
    fn root(
        &mut self,
        mine: u64,
        theirs: u64,
        moves: MoveMask,
        depth: u8,
    ) -> Option<(Position, i32)> {
        self.aborted = false;
        let mut alpha = -WIN_SCORE * 2;
        let beta = WIN_SCORE * 2;
        let mut best: Option<(Position, i32)> = None;
        for pos in ordered(moves) {
            let flips = flip_bits(mine, theirs, pos);
            let next_mine = mine | pos.bit() | flips;
            let next_theirs = theirs & !flips;
            let score = -self.negamax(next_theirs, next_mine, depth - 1, -beta, -alpha, false);
            if self.aborted {
                return None;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((pos, score));
            }
            alpha = alpha.max(score);
        }
        best
    }

    fn negamax(
        &mut self,
        mine: u64,
        theirs: u64,
        depth: u8,
        mut alpha: i32,
        beta: i32,
        passed: bool,
    ) -> i32 {
        self.nodes += 1;
        if self.enforce_deadline && self.nodes % 1024 == 0 && Instant::now() >= self.deadline {
            self.aborted = true;
        }
        if self.aborted {
            return 0;
        }

        let moves = legal_bits(mine, theirs);
        if moves == 0 {
            if passed {
                return final_score(mine, theirs);
            }
            return -self.negamax(theirs, mine, depth, -beta, -alpha, true);
        }
        if depth == 0 {
            return evaluate(mine, theirs, moves);
        }

        let mut best = -WIN_SCORE * 2;
        for pos in ordered(MoveMask::from_bits(moves)) {
            let flips = flip_bits(mine, theirs, pos);
            let score = -self.negamax(
                theirs & !flips,
                mine | pos.bit() | flips,
                depth - 1,
                -beta,
                -alpha,
                false,
            );
            best = best.max(score);
            alpha = alpha.max(score);
            if alpha >= beta {
                break;
            }
        }
        best
    }
}

/// Corners first, then index order.
fn ordered(moves: MoveMask) -> impl Iterator<Item = Position> {
    let corners = MoveMask::from_bits(moves.bits() & CORNERS);
    let rest = MoveMask::from_bits(moves.bits() & !CORNERS);
    corners.iter().chain(rest.iter())
}

fn final_score(mine: u64, theirs: u64) -> i32 {
    let diff = mine.count_ones() as i32 - theirs.count_ones() as i32;
    match diff.signum() {
        1 => WIN_SCORE + diff,
        -1 => -WIN_SCORE + diff,
        _ => 0,
    }
}

fn evaluate(mine: u64, theirs: u64, my_moves: u64) -> i32 {
    let discs = mine.count_ones() as i32 - theirs.count_ones() as i32;
    let corners = (mine & CORNERS).count_ones() as i32 - (theirs & CORNERS).count_ones() as i32;
    let mobility = my_moves.count_ones() as i32 - legal_bits(theirs, mine).count_ones() as i32;
    discs + CORNER_WEIGHT * corners + MOBILITY_WEIGHT * mobility
}
