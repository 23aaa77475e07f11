//! Gesture and keyboard navigation.
//!
//! Turns taps, drags and key presses into navigation intents and tracks the
//! live swipe offset shown while a drag is in progress.

use crate::config::GestureConfig;

/// Navigation intent produced by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    PrevItem,
    NextItem,
    CloseViewer,
    TogglePause,
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Space,
    Escape,
    Other,
}

impl Key {
    /// Map a DOM-style key name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            " " | "Space" | "Spacebar" => Key::Space,
            "Escape" | "Esc" => Key::Escape,
            _ => Key::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Whether anything exists beyond the current item in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    pub has_prev: bool,
    pub has_next: bool,
}

/// Outcome of releasing the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Navigate(Intent),
    /// Not far or fast enough; offset returns to zero.
    SnapBack,
    /// Barely moved; resolved as a tap on the zone under the start point.
    Tap(Option<Intent>),
}

#[derive(Debug, Clone, Copy)]
struct DragStart {
    origin: Point,
    started_ms: u64,
}

#[derive(Debug, Clone)]
pub struct GestureController {
    config: GestureConfig,
    viewport_width: f32,
    drag: Option<DragStart>,
    offset_px: f32,
}

impl GestureController {
    pub fn new(config: GestureConfig, viewport_width: f32) -> Self {
        Self {
            config,
            viewport_width,
            drag: None,
            offset_px: 0.0,
        }
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    pub fn offset_px(&self) -> f32 {
        self.offset_px
    }

    pub fn key(&self, key: Key) -> Option<Intent> {
        match key {
            Key::ArrowRight => Some(Intent::NextItem),
            Key::ArrowLeft => Some(Intent::PrevItem),
            Key::Space => Some(Intent::TogglePause),
            Key::Escape => Some(Intent::CloseViewer),
            Key::Other => None,
        }
    }

    /// Left third goes back, right third goes forward, middle is inert.
    pub fn tap(&self, x: f32) -> Option<Intent> {
        if self.viewport_width <= 0.0 || !(0.0..=self.viewport_width).contains(&x) {
            return None;
        }
        let third = self.viewport_width / 3.0;
        if x < third {
            Some(Intent::PrevItem)
        } else if x >= self.viewport_width - third {
            Some(Intent::NextItem)
        } else {
            None
        }
    }

    pub fn pointer_down(&mut self, point: Point, now_ms: u64) {
        self.drag = Some(DragStart {
            origin: point,
            started_ms: now_ms,
        });
        self.offset_px = 0.0;
    }

    /// Update the live offset. Returns the offset to render.
    pub fn pointer_move(&mut self, point: Point, bounds: Boundaries) -> f32 {
        let Some(drag) = self.drag else {
            return self.offset_px;
        };
        let dx = point.x - drag.origin.x;
        let dy = point.y - drag.origin.y;

        // Mostly vertical movement belongs to scrolling, not to us.
        if dy.abs() > self.config.vertical_ratio * dx.abs() {
            return self.offset_px;
        }

        let toward_missing = (dx < 0.0 && !bounds.has_next) || (dx > 0.0 && !bounds.has_prev);
        self.offset_px = if toward_missing {
            dx * self.config.boundary_resistance
        } else {
            dx
        };
        self.offset_px
    }

    pub fn pointer_up(&mut self, point: Point, now_ms: u64) -> Release {
        self.offset_px = 0.0;
        let Some(drag) = self.drag.take() else {
            return Release::SnapBack;
        };
        let dx = point.x - drag.origin.x;
        let dy = point.y - drag.origin.y;
        let distance = dx.abs();
        let elapsed_ms = now_ms.saturating_sub(drag.started_ms).max(1) as f32;
        let velocity = distance / elapsed_ms;

        // A flick short enough to sit inside the slop is still a swipe.
        let within_slop =
            distance < self.config.tap_slop_px && dy.abs() < self.config.tap_slop_px;
        if within_slop && velocity <= self.config.commit_velocity {
            return Release::Tap(self.tap(drag.origin.x));
        }
        if dy.abs() > self.config.vertical_ratio * distance {
            return Release::SnapBack;
        }

        if distance > self.config.commit_distance_px || velocity > self.config.commit_velocity {
            tracing::debug!(distance, velocity, "Swipe committed");
            if dx < 0.0 {
                Release::Navigate(Intent::NextItem)
            } else {
                Release::Navigate(Intent::PrevItem)
            }
        } else {
            Release::SnapBack
        }
    }

    /// Abandon any drag in progress.
    pub fn cancel(&mut self) {
        self.drag = None;
        self.offset_px = 0.0;
    }
}
