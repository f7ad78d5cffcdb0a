//! Pointer interaction state machine
//!
//! Turns press/drag/release events on the current page into annotation store
//! mutations: placement on empty space, move or resize while dragging, and
//! delete on a secondary press. The controller only remembers the id of the
//! annotation being dragged; the store stays the single owner of its state.

use crate::annotation::{AnnotationColor, AnnotationId, AnnotationStore};
use crate::config::EditorConfig;
use crate::error::AnnotatorResult;
use crate::manipulation::{apply_drag, generate_handles, DragMode, Handle, MinimumExtent};
use crate::transform::{CoordinateTransform, DisplayBox, DocSize, ScreenPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// A pointer event in display space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press {
        point: ScreenPoint,
        button: PointerButton,
    },
    Drag {
        point: ScreenPoint,
    },
    Release {
        point: ScreenPoint,
    },
}

/// How a newly placed annotation is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorMode {
    /// Resizable box whose font size follows its height
    #[default]
    Box,
    /// Bare anchor point with a fixed font size
    Point,
}

/// Text, size and color staged for the next placement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAnnotationConfig {
    pub text: String,
    pub font_size: u32,
    pub color_name: String,
    pub anchor: AnchorMode,
}

impl Default for PendingAnnotationConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: EditorConfig::default().default_font_size,
            color_name: "black".to_string(),
            anchor: AnchorMode::Box,
        }
    }
}

impl PendingAnnotationConfig {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_font_size(mut self, font_size: u32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_color(mut self, color_name: impl Into<String>) -> Self {
        self.color_name = color_name.into();
        self
    }

    pub fn with_anchor(mut self, anchor: AnchorMode) -> Self {
        self.anchor = anchor;
        self
    }
}

/// Part of an annotation a pointer landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitElement {
    Body,
    Handle(Handle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitTarget {
    pub id: AnnotationId,
    pub element: HitElement,
}

/// Transient drag state. Holds the annotation by id only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub id: AnnotationId,
    pub mode: DragMode,
    pub origin_box: DisplayBox,
    pub pointer_origin: ScreenPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// What a single event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    None,
    Created(AnnotationId),
    DragStarted { id: AnnotationId, mode: DragMode },
    Updated(AnnotationId),
    Deleted(AnnotationId),
    DragEnded(AnnotationId),
    /// Placement was requested with no staged text
    MissingText,
}

/// An annotation projected onto the current display surface
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayAnnotation {
    pub id: AnnotationId,
    pub bounds: DisplayBox,
    /// Resize grips; empty for point-anchored annotations
    pub handles: Vec<(Handle, DisplayBox)>,
    pub text: String,
    pub display_font_size: f64,
    pub color: AnnotationColor,
}

/// Project every annotation on `page` to display space, in creation order.
pub fn project_page(
    store: &AnnotationStore,
    page: u32,
    transform: &CoordinateTransform,
    handle_half_size: f64,
) -> Vec<DisplayAnnotation> {
    store
        .list_for_page(page)
        .map(|annotation| {
            let bounds = transform.box_to_display(annotation.position(), annotation.extent());
            let handles = if annotation.is_point_anchored() {
                Vec::new()
            } else {
                generate_handles(&bounds, handle_half_size)
            };
            DisplayAnnotation {
                id: annotation.id(),
                bounds,
                handles,
                text: annotation.text().to_string(),
                display_font_size: f64::from(annotation.font_size()) * transform.scale_y(),
                color: annotation.color().clone(),
            }
        })
        .collect()
}

/// Find what lies under `point` on `page`.
///
/// Later annotations are drawn on top, so they are tested first. Within one
/// annotation, handles win over the body. A miss is `None`, never an error.
pub fn hit_test(
    store: &AnnotationStore,
    page: u32,
    transform: &CoordinateTransform,
    handle_half_size: f64,
    point: ScreenPoint,
) -> Option<HitTarget> {
    project_page(store, page, transform, handle_half_size)
        .into_iter()
        .rev()
        .find_map(|projected| {
            let handle = projected
                .handles
                .iter()
                .find(|(_, area)| area.contains(point))
                .map(|(handle, _)| HitElement::Handle(*handle));
            handle
                .or_else(|| projected.bounds.contains(point).then_some(HitElement::Body))
                .map(|element| HitTarget {
                    id: projected.id,
                    element,
                })
        })
}

/// Everything an event needs to know about the surface it happened on
#[derive(Debug, Clone, Copy)]
pub struct InteractionContext<'a> {
    pub page: u32,
    pub transform: &'a CoordinateTransform,
    pub config: &'a EditorConfig,
}

#[derive(Debug, Default)]
pub struct InteractionController {
    state: InteractionState,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, InteractionState::Dragging(_))
    }

    /// Abandon any in-flight drag, e.g. after the page changed.
    pub fn reset(&mut self) {
        if let InteractionState::Dragging(session) = self.state {
            log::debug!("dropping drag of annotation {}", session.id);
        }
        self.state = InteractionState::Idle;
    }

    /// Feed one pointer event through the state machine.
    ///
    /// Errors come only from the store and leave it untouched.
    pub fn handle_event(
        &mut self,
        store: &mut AnnotationStore,
        ctx: InteractionContext<'_>,
        event: PointerEvent,
        pending: &PendingAnnotationConfig,
    ) -> AnnotatorResult<InteractionOutcome> {
        match event {
            PointerEvent::Press { point, button } => {
                // A press without a matching release starts over.
                self.reset();
                match button {
                    PointerButton::Primary => self.primary_press(store, ctx, point, pending),
                    PointerButton::Secondary => Ok(Self::secondary_press(store, ctx, point)),
                }
            }
            PointerEvent::Drag { point } => self.drag(store, ctx, point),
            PointerEvent::Release { .. } => Ok(self.release()),
        }
    }

    fn primary_press(
        &mut self,
        store: &mut AnnotationStore,
        ctx: InteractionContext<'_>,
        point: ScreenPoint,
        pending: &PendingAnnotationConfig,
    ) -> AnnotatorResult<InteractionOutcome> {
        let hit = hit_test(
            store,
            ctx.page,
            ctx.transform,
            ctx.config.handle_half_size,
            point,
        );

        let Some(target) = hit else {
            return Self::place(store, ctx, point, pending);
        };

        let annotation = store.get(target.id)?;
        let origin_box = ctx
            .transform
            .box_to_display(annotation.position(), annotation.extent());
        let mode = match target.element {
            HitElement::Handle(handle) => DragMode::Resize(handle),
            HitElement::Body => DragMode::Move,
        };

        self.state = InteractionState::Dragging(DragSession {
            id: target.id,
            mode,
            origin_box,
            pointer_origin: point,
        });
        log::debug!("drag started on annotation {} ({mode:?})", target.id);
        Ok(InteractionOutcome::DragStarted {
            id: target.id,
            mode,
        })
    }

    fn place(
        store: &mut AnnotationStore,
        ctx: InteractionContext<'_>,
        point: ScreenPoint,
        pending: &PendingAnnotationConfig,
    ) -> AnnotatorResult<InteractionOutcome> {
        let text = pending.text.trim();
        if text.is_empty() {
            log::warn!("placement ignored: no text staged");
            return Ok(InteractionOutcome::MissingText);
        }

        let config = ctx.config;
        let font_size = config.clamp_staged_font_size(pending.font_size);
        let position = ctx.transform.to_document(point);
        let size = match pending.anchor {
            AnchorMode::Box => Some(config.default_box_size(font_size)),
            AnchorMode::Point => None,
        };

        let id = store.create(
            ctx.page,
            position,
            size,
            text,
            font_size,
            &pending.color_name,
        )?;
        Ok(InteractionOutcome::Created(id))
    }

    fn secondary_press(
        store: &mut AnnotationStore,
        ctx: InteractionContext<'_>,
        point: ScreenPoint,
    ) -> InteractionOutcome {
        match hit_test(
            store,
            ctx.page,
            ctx.transform,
            ctx.config.handle_half_size,
            point,
        ) {
            Some(target) => {
                store.delete(target.id);
                InteractionOutcome::Deleted(target.id)
            }
            None => InteractionOutcome::None,
        }
    }

    fn drag(
        &mut self,
        store: &mut AnnotationStore,
        ctx: InteractionContext<'_>,
        point: ScreenPoint,
    ) -> AnnotatorResult<InteractionOutcome> {
        let InteractionState::Dragging(session) = self.state else {
            return Ok(InteractionOutcome::None);
        };

        let Ok(annotation) = store.get(session.id) else {
            log::warn!("annotation {} vanished mid-drag", session.id);
            self.state = InteractionState::Idle;
            return Ok(InteractionOutcome::None);
        };
        let stored_size = annotation.size();

        let dx = point.x - session.pointer_origin.x;
        let dy = point.y - session.pointer_origin.y;
        let transform = ctx.transform;
        let (width, height) = transform
            .size_to_display(DocSize::new(ctx.config.min_box_width, ctx.config.min_box_height));
        let minimum = MinimumExtent { width, height };
        let moved = apply_drag(session.mode, &session.origin_box, dx, dy, minimum);

        let (position, size) = match session.mode {
            DragMode::Move => (
                transform.to_document(ScreenPoint::new(moved.x1, moved.y1)),
                stored_size,
            ),
            DragMode::Resize(_) => {
                let (position, size) = transform.box_to_document(&moved);
                (position, Some(size))
            }
        };

        store.update_geometry(session.id, position, size)?;
        Ok(InteractionOutcome::Updated(session.id))
    }

    fn release(&mut self) -> InteractionOutcome {
        match std::mem::take(&mut self.state) {
            InteractionState::Dragging(session) => {
                log::debug!("drag ended on annotation {}", session.id);
                InteractionOutcome::DragEnded(session.id)
            }
            InteractionState::Idle => InteractionOutcome::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PagePoint;
    use proptest::prelude::*;

    struct Fixture {
        store: AnnotationStore,
        controller: InteractionController,
        transform: CoordinateTransform,
        config: EditorConfig,
    }

    impl Fixture {
        fn at_zoom(zoom: f64) -> Self {
            Self {
                store: AnnotationStore::new(),
                controller: InteractionController::new(),
                transform: CoordinateTransform::uniform(zoom).expect("valid zoom"),
                config: EditorConfig::default().with_zoom(zoom),
            }
        }

        fn send(
            &mut self,
            event: PointerEvent,
            pending: &PendingAnnotationConfig,
        ) -> InteractionOutcome {
            let ctx = InteractionContext {
                page: 0,
                transform: &self.transform,
                config: &self.config,
            };
            self.controller
                .handle_event(&mut self.store, ctx, event, pending)
                .expect("event should be handled")
        }

        fn press(&mut self, x: f64, y: f64) -> InteractionOutcome {
            self.send(
                PointerEvent::Press {
                    point: ScreenPoint::new(x, y),
                    button: PointerButton::Primary,
                },
                &PendingAnnotationConfig::default(),
            )
        }

        fn drag(&mut self, x: f64, y: f64) -> InteractionOutcome {
            self.send(
                PointerEvent::Drag {
                    point: ScreenPoint::new(x, y),
                },
                &PendingAnnotationConfig::default(),
            )
        }

        fn release(&mut self) -> InteractionOutcome {
            self.send(
                PointerEvent::Release {
                    point: ScreenPoint::new(0.0, 0.0),
                },
                &PendingAnnotationConfig::default(),
            )
        }

        /// Box annotation at display (100,100)-(300,150) when zoom is 1.0
        fn with_reference_box(mut self) -> (Self, AnnotationId) {
            let id = self
                .store
                .create(
                    0,
                    PagePoint::new(100.0, 100.0),
                    Some(DocSize::new(200.0, 50.0)),
                    "box",
                    12,
                    "black",
                )
                .expect("create should succeed");
            (self, id)
        }

        fn display_box(&self, id: AnnotationId) -> DisplayBox {
            let annotation = self.store.get(id).expect("annotation exists");
            self.transform
                .box_to_display(annotation.position(), annotation.extent())
        }
    }

    #[test]
    fn placement_at_origin_round_trips() {
        let mut fixture = Fixture::at_zoom(1.5);
        let outcome = fixture.send(
            PointerEvent::Press {
                point: ScreenPoint::new(0.0, 0.0),
                button: PointerButton::Primary,
            },
            &PendingAnnotationConfig::new("Hello"),
        );
        let InteractionOutcome::Created(id) = outcome else {
            panic!("expected a placement, got {outcome:?}");
        };

        let display = fixture.display_box(id);
        assert_eq!((display.x1, display.y1), (0.0, 0.0));
        let annotation = fixture.store.get(id).expect("annotation exists");
        assert_eq!(annotation.position(), PagePoint::new(0.0, 0.0));
        assert_eq!(annotation.size(), Some(DocSize::new(200.0, 27.0)));
        assert_eq!(annotation.font_size(), 18);
        assert!(!fixture.controller.is_dragging());
    }

    #[test]
    fn placement_without_text_reports_missing_text() {
        let mut fixture = Fixture::at_zoom(1.0);
        assert_eq!(fixture.press(50.0, 50.0), InteractionOutcome::MissingText);
        assert!(fixture.store.is_empty());
    }

    #[test]
    fn point_anchor_placement_keeps_staged_font() {
        let mut fixture = Fixture::at_zoom(1.0);
        let pending = PendingAnnotationConfig::new("pin")
            .with_font_size(100)
            .with_anchor(AnchorMode::Point)
            .with_color("blue");
        let outcome = fixture.send(
            PointerEvent::Press {
                point: ScreenPoint::new(10.0, 10.0),
                button: PointerButton::Primary,
            },
            &pending,
        );
        let InteractionOutcome::Created(id) = outcome else {
            panic!("expected a placement, got {outcome:?}");
        };
        let annotation = fixture.store.get(id).expect("annotation exists");
        assert!(annotation.is_point_anchored());
        assert_eq!(annotation.font_size(), 72);
        assert_eq!(annotation.color().name(), "blue");
    }

    #[test]
    fn top_left_drag_resizes_box() {
        let (mut fixture, id) = Fixture::at_zoom(1.0).with_reference_box();

        assert_eq!(
            fixture.press(100.0, 100.0),
            InteractionOutcome::DragStarted {
                id,
                mode: DragMode::Resize(Handle::TopLeft)
            }
        );
        assert_eq!(fixture.drag(150.0, 120.0), InteractionOutcome::Updated(id));
        assert_eq!(
            fixture.display_box(id),
            DisplayBox::new(150.0, 120.0, 300.0, 150.0)
        );
        assert_eq!(fixture.release(), InteractionOutcome::DragEnded(id));
        assert!(!fixture.controller.is_dragging());
    }

    #[test]
    fn top_left_drag_clamps_to_minimum_height() {
        let (mut fixture, id) = Fixture::at_zoom(1.0).with_reference_box();

        fixture.press(100.0, 100.0);
        fixture.drag(150.0, 240.0);

        let size = fixture
            .store
            .get(id)
            .expect("annotation exists")
            .size()
            .expect("box annotation");
        assert_eq!(size.height, 15.0);
        assert_eq!(fixture.display_box(id).y2, 150.0);
    }

    #[test]
    fn body_drag_moves_without_resizing() {
        let (mut fixture, id) = Fixture::at_zoom(1.0).with_reference_box();

        assert_eq!(
            fixture.press(200.0, 125.0),
            InteractionOutcome::DragStarted {
                id,
                mode: DragMode::Move
            }
        );
        fixture.drag(210.0, 105.0);

        let annotation = fixture.store.get(id).expect("annotation exists");
        assert_eq!(annotation.position(), PagePoint::new(110.0, 80.0));
        assert_eq!(annotation.size(), Some(DocSize::new(200.0, 50.0)));
    }

    #[test]
    fn drag_updates_are_live() {
        let (mut fixture, id) = Fixture::at_zoom(2.0).with_reference_box();

        fixture.press(400.0, 250.0);
        fixture.drag(410.0, 250.0);
        assert_eq!(fixture.store.get(id).expect("exists").position().x, 105.0);
        fixture.drag(420.0, 250.0);
        assert_eq!(fixture.store.get(id).expect("exists").position().x, 110.0);
    }

    #[test]
    fn resize_at_zoom_respects_document_minimum() {
        let (mut fixture, id) = Fixture::at_zoom(2.0).with_reference_box();

        // bottom-right grip sits at (600, 300) in display space
        fixture.press(600.0, 300.0);
        fixture.drag(0.0, 0.0);

        let size = fixture
            .store
            .get(id)
            .expect("annotation exists")
            .size()
            .expect("box annotation");
        assert!((size.width - 30.0).abs() < 1e-9);
        assert!((size.height - 15.0).abs() < 1e-9);
    }

    #[test]
    fn secondary_press_deletes_hit_annotation() {
        let (mut fixture, id) = Fixture::at_zoom(1.0).with_reference_box();
        let secondary = |x, y| PointerEvent::Press {
            point: ScreenPoint::new(x, y),
            button: PointerButton::Secondary,
        };
        let pending = PendingAnnotationConfig::new("ignored");

        assert_eq!(
            fixture.send(secondary(5.0, 5.0), &pending),
            InteractionOutcome::None
        );
        assert_eq!(
            fixture.send(secondary(200.0, 125.0), &pending),
            InteractionOutcome::Deleted(id)
        );
        assert!(fixture.store.is_empty());
        assert!(!fixture.controller.is_dragging());
    }

    #[test]
    fn drag_on_vanished_annotation_returns_to_idle() {
        let (mut fixture, id) = Fixture::at_zoom(1.0).with_reference_box();

        fixture.press(200.0, 125.0);
        fixture.store.delete(id);
        assert_eq!(fixture.drag(220.0, 125.0), InteractionOutcome::None);
        assert!(!fixture.controller.is_dragging());
    }

    #[test]
    fn stale_hit_is_a_miss() {
        let (fixture, _) = Fixture::at_zoom(1.0).with_reference_box();
        let hit = hit_test(
            &fixture.store,
            3,
            &fixture.transform,
            5.0,
            ScreenPoint::new(200.0, 125.0),
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn topmost_annotation_wins() {
        let (mut fixture, _) = Fixture::at_zoom(1.0).with_reference_box();
        let upper = fixture
            .store
            .create(0, PagePoint::new(150.0, 110.0), None, "pin", 12, "red")
            .expect("create should succeed");

        let hit = hit_test(
            &fixture.store,
            0,
            &fixture.transform,
            5.0,
            ScreenPoint::new(160.0, 120.0),
        );
        assert_eq!(
            hit,
            Some(HitTarget {
                id: upper,
                element: HitElement::Body
            })
        );
    }

    #[test]
    fn point_annotations_have_no_handles() {
        let mut store = AnnotationStore::new();
        store
            .create(0, PagePoint::new(0.0, 0.0), None, "pin", 12, "red")
            .expect("create should succeed");
        let transform = CoordinateTransform::uniform(1.0).expect("valid zoom");

        let projected = project_page(&store, 0, &transform, 5.0);
        assert_eq!(projected.len(), 1);
        assert!(projected[0].handles.is_empty());
    }

    fn any_handle() -> impl Strategy<Value = Handle> {
        proptest::sample::select(Handle::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn resize_gestures_keep_store_invariants(
            zoom in 0.5f64..4.0,
            handle in any_handle(),
            moves in proptest::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..8),
        ) {
            let (mut fixture, id) = Fixture::at_zoom(zoom).with_reference_box();
            let grip = handle.anchor(&fixture.display_box(id));

            fixture.press(grip.x, grip.y);
            prop_assert!(fixture.controller.is_dragging());
            for (dx, dy) in moves {
                fixture.drag(grip.x + dx, grip.y + dy);
                let size = fixture.store.get(id).expect("exists").size().expect("box");
                prop_assert!(size.width >= 30.0);
                prop_assert!(size.height >= 15.0);
                prop_assert!(fixture.display_box(id).is_ordered());
            }
            fixture.release();
        }
    }
}
