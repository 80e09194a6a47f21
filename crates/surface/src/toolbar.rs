//! Toolbar action placement.
//!
//! Every `(mode, viewport, action)` triple resolves to exactly one
//! [`ToolbarSurface`]. The compiled-in base table is merged with the active
//! package's override rules through the layer engine; anything not placed by
//! either resolves to [`ToolbarSurface::Hidden`].

use crate::layer::{Layer, LayerName, MergeDiagnostic, UiItemRule, merge_layers};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolbarMode {
    Draw,
    Playback,
    Canvas,
}

impl ToolbarMode {
    pub const ALL: [ToolbarMode; 3] = [Self::Draw, Self::Playback, Self::Canvas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Playback => "playback",
            Self::Canvas => "canvas",
        }
    }

    /// Action ids this mode places, in display order.
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Self::Draw => &actions::DRAW,
            Self::Playback => &actions::PLAYBACK,
            Self::Canvas => &actions::CANVAS,
        }
    }
}

impl fmt::Display for ToolbarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Desktop,
    Tablet,
    Mobile,
}

impl Viewport {
    pub const ALL: [Viewport; 3] = [Self::Desktop, Self::Tablet, Self::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Tablet => "tablet",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an action is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolbarSurface {
    Primary,
    More,
    #[default]
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarActionSurfaceRule {
    pub mode: ToolbarMode,
    pub viewport: Viewport,
    pub action_id: String,
    pub surface: ToolbarSurface,
}

pub mod actions {
    pub const PEN: &str = "pen";
    pub const HIGHLIGHTER: &str = "highlighter";
    pub const ERASER: &str = "eraser";
    pub const SHAPES: &str = "shapes";
    pub const COLOR: &str = "color";
    pub const UNDO: &str = "undo";
    pub const CLEAR: &str = "clear";

    pub const PLAY_PAUSE: &str = "play-pause";
    pub const NEXT_STEP: &str = "next-step";
    pub const PREVIOUS_STEP: &str = "previous-step";
    pub const SPEED: &str = "speed";
    pub const INSERT_BREAK: &str = "insert-break";
    pub const INSERT_PAUSE: &str = "insert-pause";

    pub const ZOOM: &str = "zoom";
    pub const PAN: &str = "pan";
    pub const ADD_PAGE: &str = "add-page";
    pub const BACKGROUND: &str = "background";
    pub const GRID: &str = "grid";

    pub const DRAW: [&str; 7] = [PEN, HIGHLIGHTER, ERASER, SHAPES, COLOR, UNDO, CLEAR];
    pub const PLAYBACK: [&str; 6] = [PLAY_PAUSE, NEXT_STEP, PREVIOUS_STEP, SPEED, INSERT_BREAK, INSERT_PAUSE];
    pub const CANVAS: [&str; 5] = [ZOOM, PAN, ADD_PAGE, BACKGROUND, GRID];

    /// Legacy break-insertion group, suppressed wholesale once cutover is enabled.
    pub const LEGACY_BREAK_GROUP: [&str; 2] = [INSERT_BREAK, INSERT_PAUSE];
}

use ToolbarSurface::{Hidden as H, More as M, Primary as P};

/// Base placements as `[desktop, tablet, mobile]` per action.
const BASE_TABLE: &[(ToolbarMode, &str, [ToolbarSurface; 3])] = &[
    (ToolbarMode::Draw, actions::PEN, [P, P, P]),
    (ToolbarMode::Draw, actions::HIGHLIGHTER, [P, M, M]),
    (ToolbarMode::Draw, actions::ERASER, [P, P, P]),
    (ToolbarMode::Draw, actions::SHAPES, [P, M, M]),
    (ToolbarMode::Draw, actions::COLOR, [P, P, M]),
    (ToolbarMode::Draw, actions::UNDO, [P, P, P]),
    (ToolbarMode::Draw, actions::CLEAR, [M, M, M]),
    (ToolbarMode::Playback, actions::PLAY_PAUSE, [P, P, P]),
    (ToolbarMode::Playback, actions::NEXT_STEP, [P, P, P]),
    (ToolbarMode::Playback, actions::PREVIOUS_STEP, [P, P, M]),
    (ToolbarMode::Playback, actions::SPEED, [P, M, M]),
    (ToolbarMode::Playback, actions::INSERT_BREAK, [P, M, M]),
    (ToolbarMode::Playback, actions::INSERT_PAUSE, [M, M, H]),
    (ToolbarMode::Canvas, actions::ZOOM, [P, P, P]),
    (ToolbarMode::Canvas, actions::PAN, [P, P, M]),
    (ToolbarMode::Canvas, actions::ADD_PAGE, [P, M, M]),
    (ToolbarMode::Canvas, actions::BACKGROUND, [M, M, M]),
    (ToolbarMode::Canvas, actions::GRID, [M, M, H]),
];

/// The compiled-in base rule table.
pub fn base_rules() -> Vec<ToolbarActionSurfaceRule> {
    BASE_TABLE
        .iter()
        .flat_map(|(mode, action, surfaces)| {
            Viewport::ALL
                .into_iter()
                .zip(surfaces.iter())
                .map(move |(viewport, surface)| ToolbarActionSurfaceRule {
                    mode: *mode,
                    viewport,
                    action_id: (*action).to_string(),
                    surface: *surface,
                })
        })
        .collect()
}

/// Lookup key for a placement.
pub fn surface_key(mode: ToolbarMode, viewport: Viewport, action_id: &str) -> String {
    format!("{mode}:{viewport}:{}", action_id.trim())
}

fn to_item_rule(rule: &ToolbarActionSurfaceRule) -> UiItemRule<ToolbarSurface> {
    UiItemRule::add(
        format!("{}:{}", rule.mode, rule.viewport),
        rule.action_id.clone(),
        rule.surface,
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawToolbarSurfacePolicy {
    pub show_pen: bool,
    pub show_highlighter: bool,
    pub show_eraser: bool,
    pub show_shapes: bool,
    pub show_color_picker: bool,
    pub show_undo: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackToolbarSurfacePolicy {
    pub show_play_pause: bool,
    pub show_step_controls: bool,
    pub show_speed_control: bool,
    pub show_break_insertion: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasToolbarSurfacePolicy {
    pub show_zoom: bool,
    pub show_pan: bool,
    pub show_page_controls: bool,
    pub show_background_picker: bool,
    pub show_grid_toggle: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MorePanelSurfacePolicy {
    pub enabled: bool,
    pub item_count: usize,
    pub has_destructive_actions: bool,
    pub has_break_insertion: bool,
}

/// Full placement plan for one `(mode, viewport)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedToolbarPlan {
    pub mode: ToolbarMode,
    pub viewport: Viewport,
    pub cutover_enabled: bool,
    pub actions: BTreeMap<String, ToolbarSurface>,
    pub draw: DrawToolbarSurfacePolicy,
    pub playback: PlaybackToolbarSurfacePolicy,
    pub canvas: CanvasToolbarSurfacePolicy,
    pub more_panel: MorePanelSurfacePolicy,
}

/// Resolves action placements from the base table plus package overrides.
#[derive(Debug, Clone)]
pub struct ToolbarSurfaceResolver {
    table: HashMap<String, ToolbarSurface>,
    cutover_enabled: bool,
    diagnostics: Vec<MergeDiagnostic>,
}

impl ToolbarSurfaceResolver {
    /// Base table layered under `overrides`; an override for a key fully
    /// replaces the base placement for that key.
    pub fn new(overrides: &[ToolbarActionSurfaceRule], cutover_enabled: bool) -> Self {
        let base = Layer::new(LayerName::Base, base_rules().iter().map(to_item_rule).collect());
        let package = Layer::new(LayerName::Package, overrides.iter().map(to_item_rule).collect());
        let merged = merge_layers(&[base, package]);

        let table = merged
            .items
            .iter()
            .map(|item| (format!("{}:{}", item.slot_id, item.item_id), item.value))
            .collect();

        Self {
            table,
            cutover_enabled,
            diagnostics: merged.diagnostics,
        }
    }

    pub fn builtin() -> Self {
        Self::new(&[], false)
    }

    pub fn cutover_enabled(&self) -> bool {
        self.cutover_enabled
    }

    pub fn diagnostics(&self) -> &[MergeDiagnostic] {
        &self.diagnostics
    }

    /// Placement for one action. Unplaced actions are hidden.
    pub fn resolve(&self, mode: ToolbarMode, viewport: Viewport, action_id: &str) -> ToolbarSurface {
        let surface = self
            .table
            .get(&surface_key(mode, viewport, action_id))
            .copied()
            .unwrap_or(ToolbarSurface::Hidden);

        let legacy = actions::LEGACY_BREAK_GROUP.contains(&action_id.trim());
        if self.cutover_enabled && legacy {
            return ToolbarSurface::Hidden;
        }
        surface
    }

    fn primary(&self, mode: ToolbarMode, viewport: Viewport, action_id: &str) -> bool {
        self.resolve(mode, viewport, action_id) == ToolbarSurface::Primary
    }

    fn visible(&self, mode: ToolbarMode, viewport: Viewport, action_id: &str) -> bool {
        self.resolve(mode, viewport, action_id) != ToolbarSurface::Hidden
    }

    pub fn resolve_draw_toolbar_surface_policy(&self, viewport: Viewport) -> DrawToolbarSurfacePolicy {
        let mode = ToolbarMode::Draw;
        DrawToolbarSurfacePolicy {
            show_pen: self.primary(mode, viewport, actions::PEN),
            show_highlighter: self.primary(mode, viewport, actions::HIGHLIGHTER),
            show_eraser: self.primary(mode, viewport, actions::ERASER),
            show_shapes: self.primary(mode, viewport, actions::SHAPES),
            show_color_picker: self.primary(mode, viewport, actions::COLOR),
            show_undo: self.primary(mode, viewport, actions::UNDO),
        }
    }

    pub fn resolve_playback_toolbar_surface_policy(
        &self,
        viewport: Viewport,
    ) -> PlaybackToolbarSurfacePolicy {
        let mode = ToolbarMode::Playback;
        PlaybackToolbarSurfacePolicy {
            show_play_pause: self.primary(mode, viewport, actions::PLAY_PAUSE),
            show_step_controls: self.primary(mode, viewport, actions::NEXT_STEP)
                && self.primary(mode, viewport, actions::PREVIOUS_STEP),
            show_speed_control: self.primary(mode, viewport, actions::SPEED),
            show_break_insertion: self.primary(mode, viewport, actions::INSERT_BREAK),
        }
    }

    pub fn resolve_canvas_toolbar_surface_policy(&self, viewport: Viewport) -> CanvasToolbarSurfacePolicy {
        let mode = ToolbarMode::Canvas;
        CanvasToolbarSurfacePolicy {
            show_zoom: self.primary(mode, viewport, actions::ZOOM),
            show_pan: self.primary(mode, viewport, actions::PAN),
            show_page_controls: self.primary(mode, viewport, actions::ADD_PAGE),
            show_background_picker: self.visible(mode, viewport, actions::BACKGROUND),
            show_grid_toggle: self.visible(mode, viewport, actions::GRID),
        }
    }

    pub fn resolve_more_panel_surface_policy(
        &self,
        mode: ToolbarMode,
        viewport: Viewport,
    ) -> MorePanelSurfacePolicy {
        let in_more = |action: &str| self.resolve(mode, viewport, action) == ToolbarSurface::More;
        let item_count = mode.actions().iter().filter(|&&a| in_more(a)).count();
        MorePanelSurfacePolicy {
            enabled: item_count > 0,
            item_count,
            has_destructive_actions: in_more(actions::CLEAR),
            has_break_insertion: actions::LEGACY_BREAK_GROUP.iter().any(|&a| in_more(a)),
        }
    }

    pub fn plan(&self, mode: ToolbarMode, viewport: Viewport) -> ResolvedToolbarPlan {
        ResolvedToolbarPlan {
            mode,
            viewport,
            cutover_enabled: self.cutover_enabled,
            actions: mode
                .actions()
                .iter()
                .map(|&a| (a.to_string(), self.resolve(mode, viewport, a)))
                .collect(),
            draw: self.resolve_draw_toolbar_surface_policy(viewport),
            playback: self.resolve_playback_toolbar_surface_policy(viewport),
            canvas: self.resolve_canvas_toolbar_surface_policy(viewport),
            more_panel: self.resolve_more_panel_surface_policy(mode, viewport),
        }
    }

    /// Plans for every mode and viewport.
    pub fn plan_all(&self) -> Vec<ResolvedToolbarPlan> {
        ToolbarMode::ALL
            .into_iter()
            .flat_map(|mode| Viewport::ALL.into_iter().map(move |viewport| (mode, viewport)))
            .map(|(mode, viewport)| self.plan(mode, viewport))
            .collect()
    }
}

impl Default for ToolbarSurfaceResolver {
    fn default() -> Self {
        Self::builtin()
    }
}
