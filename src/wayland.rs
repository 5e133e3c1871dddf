// Wayland integration module
// Layer-shell overlay window, seat input and drag-and-drop via smithay-client-toolkit

use crate::app::{Button, Effect, Gesture, OverlayState, Point};
use crate::drop::{first_local_path, URI_LIST_MIME};
use crate::image_loader::LoadError;
use crate::render;
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    data_device_manager::{
        data_device::{DataDevice, DataDeviceHandler},
        data_offer::{DataOfferHandler, DragOffer},
        data_source::DataSourceHandler,
        DataDeviceManagerState, WritePipe,
    },
    delegate_compositor, delegate_data_device, delegate_keyboard, delegate_layer,
    delegate_output, delegate_pointer, delegate_registry, delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use std::io::Read;
use std::time::Instant;
use wayland_client::{
    globals::registry_queue_init,
    protocol::{
        wl_data_device::WlDataDevice, wl_data_device_manager::DndAction,
        wl_data_source::WlDataSource, wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm,
        wl_surface,
    },
    Connection, Proxy, QueueHandle,
};

/// Mouse button constants (linux/input-event-codes.h)
const BTN_LEFT: u32 = 272;
const BTN_RIGHT: u32 = 273;

/// Maximum window size to prevent buffer allocation failures
const MAX_SIZE: u32 = 4096;

/// Maximum buffer size (64MB to avoid Wayland buffer issues)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Minimum time between redraws while a resize gesture is running
const MIN_RESIZE_FRAME_INTERVAL_MS: u128 = 16;

fn map_button(code: u32) -> Button {
    match code {
        BTN_LEFT => Button::Left,
        BTN_RIGHT => Button::Right,
        other => Button::Other(other),
    }
}

/// Main Wayland application state
struct WaylandApp {
    registry_state: RegistryState,
    seat_state: SeatState,
    output_state: OutputState,
    shm: Shm,
    layer_shell: LayerShell,
    compositor_state: CompositorState,
    data_device_manager: DataDeviceManagerState,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut std::ffi::c_void,

    /// Everything the gestures and drops act on
    overlay: OverlayState,

    // Surface and buffer management
    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    configured: bool,

    // Input state
    pointer_pos: (f64, f64),
    ctrl_held: bool,
    data_device: Option<DataDevice>,
    /// Whether the offer currently hovering carries something we can load
    drag_acceptable: bool,

    qh: QueueHandle<WaylandApp>,
    needs_redraw: bool,
    frame_requested: bool,
    last_resize_draw: Option<Instant>,

    // GPU rendering
    use_gpu: bool,
    gpu_renderer: Option<WgpuRenderer>,
    gpu_initialized: bool,
}

impl WaylandApp {
    /// Pointer position in output coordinates; layer-shell margins are our position
    fn global_pointer(&self) -> Point {
        let geometry = self.overlay.geometry();
        Point::new(
            geometry.x as f64 + self.pointer_pos.0,
            geometry.y as f64 + self.pointer_pos.1,
        )
    }

    fn local_pointer(&self) -> Point {
        Point::new(self.pointer_pos.0, self.pointer_pos.1)
    }

    /// Push the outcome of a state change to the compositor
    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Move => self.update_position(),
            Effect::Resize => self.update_size(),
            Effect::Repaint => {
                self.needs_redraw = true;
                self.draw();
            }
        }
    }

    /// Update window position using layer shell margins
    fn update_position(&mut self) {
        let geometry = self.overlay.geometry();
        if let Some(ref layer_surface) = self.layer_surface {
            layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
            layer_surface.set_margin(geometry.y, 0, 0, geometry.x);
            layer_surface.commit();
        }
    }

    /// Request the overlay's size; the redraw follows on configure
    fn update_size(&mut self) {
        let geometry = self.overlay.geometry();
        let (width, height) = cap_size(geometry.width, geometry.height, MAX_SIZE);
        if (width, height) != (geometry.width, geometry.height) {
            debug!("Capping window at {}x{}", width, height);
            self.overlay.set_size(width, height);
        }

        if let Some(ref layer_surface) = self.layer_surface {
            layer_surface.set_size(width, height);
            layer_surface.commit();
        }
        // Reset pool to force buffer recreation
        self.pool = None;
        self.needs_redraw = true;
    }

    /// Ask for a frame callback so a skipped draw gets retried
    fn schedule_frame(&mut self) {
        if self.frame_requested {
            return;
        }
        if let Some(ref layer_surface) = self.layer_surface {
            let surface = layer_surface.wl_surface();
            surface.frame(&self.qh, surface.clone());
            surface.commit();
            self.frame_requested = true;
        }
    }

    /// Initialize GPU renderer from Wayland surface
    fn init_gpu_renderer(&mut self) {
        if self.gpu_initialized {
            return;
        }
        self.gpu_initialized = true;

        let Some(layer_surface) = &self.layer_surface else {
            warn!("Cannot init GPU: no layer surface");
            return;
        };

        // With wayland-backend's client_system feature, ObjectId::as_ptr gives the wl_proxy
        let surface_ptr = layer_surface.wl_surface().id().as_ptr() as *mut std::ffi::c_void;
        if self.display_ptr.is_null() {
            warn!("Display pointer is null, falling back to CPU rendering");
            self.use_gpu = false;
            return;
        }

        let geometry = self.overlay.geometry();
        match WgpuRenderer::new(self.display_ptr, surface_ptr, geometry.width, geometry.height) {
            Ok(renderer) => {
                self.gpu_renderer = Some(renderer);
                info!("GPU renderer initialized successfully");
            }
            Err(e) => {
                warn!("Failed to initialize GPU renderer: {:?}", e);
                warn!("Falling back to CPU rendering");
                self.use_gpu = false;
            }
        }
    }

    /// Draw the current state to the surface
    fn draw(&mut self) {
        if !self.configured || self.layer_surface.is_none() {
            return;
        }

        // The placeholder is only ever drawn on the CPU
        if self.use_gpu && !self.overlay.placeholder_visible() {
            self.init_gpu_renderer();
            if self.use_gpu {
                self.draw_gpu();
                return;
            }
            warn!("GPU rendering disabled, falling back to CPU");
        }

        self.draw_cpu();
    }

    /// Draw using GPU (wgpu); hard failures turn `use_gpu` off
    fn draw_gpu(&mut self) {
        let Some(bitmap) = self.overlay.displayed() else {
            return;
        };
        let Some(renderer) = self.gpu_renderer.as_mut() else {
            self.use_gpu = false;
            return;
        };

        let generation = self.overlay.generation();
        if renderer.needs_upload(generation) {
            if let Err(e) = renderer.upload_texture(bitmap, generation) {
                warn!("Failed to upload texture to GPU: {:?}", e);
                self.use_gpu = false;
                return;
            }
        }

        let geometry = self.overlay.geometry();
        renderer.resize(geometry.width, geometry.height);

        match renderer.render() {
            Ok(true) => {
                if let Some(ref layer_surface) = self.layer_surface {
                    layer_surface.wl_surface().commit();
                }
                self.needs_redraw = false;
            }
            Ok(false) => self.schedule_frame(),
            Err(e) => {
                warn!("GPU render error: {:?}", e);
                self.use_gpu = false;
            }
        }
    }

    /// Draw using CPU (shared memory buffer)
    fn draw_cpu(&mut self) {
        let geometry = self.overlay.geometry();
        let width = geometry.width.clamp(1, MAX_SIZE);
        let height = geometry.height.clamp(1, MAX_SIZE);

        let stride = width as i32 * 4;
        let buffer_size = stride as usize * height as usize;
        if buffer_size > MAX_BUFFER_SIZE {
            error!("Buffer size too large: {} bytes, max: {} bytes", buffer_size, MAX_BUFFER_SIZE);
            return;
        }

        let resizing = matches!(self.overlay.gesture(), Gesture::Resizing { .. });
        if resizing {
            let now = Instant::now();
            if !resize_frame_due(self.last_resize_draw, now) {
                self.schedule_frame();
                return;
            }
            self.last_resize_draw = Some(now);
        }

        if self.pool.is_none() {
            match SlotPool::new(buffer_size, &self.shm) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    error!("Failed to create slot pool: {}. Buffer size: {} bytes", e, buffer_size);
                    return;
                }
            }
        }
        let Some(pool) = self.pool.as_mut() else {
            return;
        };

        if pool.len() < buffer_size {
            if let Err(e) = pool.resize(buffer_size) {
                error!("Failed to resize pool to {} bytes: {}", buffer_size, e);
                self.pool = None;
                return;
            }
        }

        let format = wl_shm::Format::Argb8888;
        let (buffer, canvas) =
            match pool.create_buffer(width as i32, height as i32, stride, format) {
                Ok(buf) => buf,
                Err(e) => {
                    error!("Failed to create buffer {}x{}: {}", width, height, e);
                    return;
                }
            };

        match self.overlay.displayed() {
            // Nearest-neighbour keeps resize responsive; release triggers a smooth frame
            Some(bitmap) if resizing => render::render_image_fast(bitmap, canvas, width, height),
            Some(bitmap) => render::render_image(bitmap, canvas, width, height),
            None => render::render_placeholder(canvas, width, height),
        }
        render::render_resize_grip(canvas, width, height);

        let Some(layer_surface) = self.layer_surface.as_ref() else {
            return;
        };
        let surface = layer_surface.wl_surface();
        if let Err(e) = buffer.attach_to(surface) {
            error!("Failed to attach buffer: {}", e);
            return;
        }
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
        self.needs_redraw = false;
    }

    /// Load whatever the current drag offer carries
    fn receive_drop(&mut self, conn: &Connection, offer: &DragOffer) {
        let mut pipe = match offer.receive(URI_LIST_MIME.to_string()) {
            Ok(pipe) => pipe,
            Err(e) => {
                warn!("Failed to receive drop data: {}", e);
                return;
            }
        };
        // The source only starts writing once it sees our receive request
        if let Err(e) = conn.flush() {
            warn!("Failed to flush Wayland connection: {}", e);
            return;
        }

        let mut payload = String::new();
        if let Err(e) = pipe.read_to_string(&mut payload) {
            warn!("Failed to read drop data: {}", e);
            return;
        }

        let Some(path) = first_local_path(&payload) else {
            debug!("Drop carried no local file: {:?}", payload);
            return;
        };

        match self.overlay.drop_path(&path) {
            Ok(effect) => {
                if let Some(image) = self.overlay.image() {
                    info!("Showing {} ({}x{})", path.display(), image.width, image.height);
                }
                self.apply(effect);
            }
            Err(e @ LoadError::Unsupported(_)) | Err(e @ LoadError::NotAFile(_)) => {
                debug!("Ignoring drop: {}", e);
            }
            Err(e) => warn!("{}", e),
        }
    }
}

// Implement required traits for smithay-client-toolkit

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        self.frame_requested = false;
        if self.needs_redraw {
            self.draw();
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.overlay.request_exit();
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        let geometry = self.overlay.geometry();
        let (new_w, new_h) = configure.new_size;
        if matches!(self.overlay.gesture(), Gesture::Resizing { .. }) {
            // Keep our own size while the user is resizing
            if let Some(ref layer_surface) = self.layer_surface {
                layer_surface.set_size(geometry.width, geometry.height);
                layer_surface.commit();
            }
        } else if new_w > 0 && new_h > 0 && (new_w, new_h) != (geometry.width, geometry.height) {
            debug!("Compositor chose {}x{}", new_w, new_h);
            self.overlay.set_size(new_w, new_h);
            self.pool = None;
        }

        self.configured = true;
        self.needs_redraw = true;
        self.draw();
    }
}

impl SeatHandler for WaylandApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, seat: wl_seat::WlSeat) {
        debug!("New seat");
        if self.data_device.is_none() {
            self.data_device = Some(self.data_device_manager.get_data_device(qh, &seat));
        }
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
        if capability == Capability::Pointer {
            if let Err(e) = self.seat_state.get_pointer(qh, &seat) {
                error!("Failed to get pointer: {}", e);
            }
        }
        if self.data_device.is_none() {
            self.data_device = Some(self.data_device_manager.get_data_device(qh, &seat));
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("Capability removed: {:?}", capability);
        if capability == Capability::Pointer {
            self.overlay.cancel_gesture();
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("Seat removed");
    }
}

impl KeyboardHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        debug!("Keyboard entered surface");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard left surface");
        self.ctrl_held = false;
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        debug!("Key pressed: {:?}", event.keysym);

        let key = if event.keysym == Keysym::q || event.keysym == Keysym::Q {
            Some('q')
        } else {
            None
        };
        let effect = self.overlay.key_pressed(key, self.ctrl_held);
        self.apply(effect);
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _event: KeyEvent,
    ) {
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        modifiers: Modifiers,
        _layout: u32,
    ) {
        self.ctrl_held = modifiers.ctrl;
    }
}

impl PointerHandler for WaylandApp {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            match event.kind {
                PointerEventKind::Enter { .. } => {
                    self.pointer_pos = event.position;
                    debug!("Pointer entered");
                }
                PointerEventKind::Leave { .. } => {
                    // An implicit grab keeps delivering motion until release
                    debug!("Pointer left");
                }
                PointerEventKind::Motion { .. } => {
                    self.pointer_pos = event.position;
                    let effect = self.overlay.motion(self.global_pointer());
                    self.apply(effect);
                }
                PointerEventKind::Press { button, .. } => {
                    debug!("Pointer button pressed: {}", button);
                    let effect = self.overlay.press(
                        map_button(button),
                        self.local_pointer(),
                        self.global_pointer(),
                    );
                    self.apply(effect);
                }
                PointerEventKind::Release { button, .. } => {
                    let effect = self.overlay.release(map_button(button));
                    if effect == Effect::Repaint {
                        self.last_resize_draw = None;
                    }
                    self.apply(effect);
                }
                PointerEventKind::Axis { vertical, .. } => {
                    // Positive axis values scroll down, i.e. toward the user
                    if vertical.absolute != 0.0 {
                        let ticks = if vertical.absolute > 0.0 { -1 } else { 1 };
                        let effect = self.overlay.wheel(ticks);
                        if effect != Effect::None {
                            debug!(
                                "Scale {:.1}, opacity {}",
                                self.overlay.scale_factor(),
                                self.overlay.opacity().value()
                            );
                        }
                        self.apply(effect);
                    }
                }
            }
        }
    }
}

impl DataDeviceHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
        _x: f64,
        _y: f64,
        _surface: &wl_surface::WlSurface,
    ) {
        let Some(offer) = self.data_device.as_ref().and_then(|d| d.data().drag_offer()) else {
            return;
        };

        self.drag_acceptable =
            offer.with_mime_types(|types| types.iter().any(|m| m == URI_LIST_MIME));
        debug!("Drag entered (file list offered: {})", self.drag_acceptable);

        if self.drag_acceptable {
            offer.set_actions(DndAction::Copy, DndAction::Copy);
            offer.accept_mime_type(offer.serial, Some(URI_LIST_MIME.to_string()));
        } else {
            offer.accept_mime_type(offer.serial, None);
        }
    }

    fn leave(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _data_device: &WlDataDevice) {
        debug!("Drag left");
        self.drag_acceptable = false;
    }

    fn motion(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
        _x: f64,
        _y: f64,
    ) {
    }

    fn selection(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
    ) {
    }

    fn drop_performed(
        &mut self,
        conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
    ) {
        let Some(offer) = self.data_device.as_ref().and_then(|d| d.data().drag_offer()) else {
            return;
        };

        if self.drag_acceptable {
            self.receive_drop(conn, &offer);
            offer.finish();
        }
        offer.destroy();
        self.drag_acceptable = false;
    }
}

impl DataOfferHandler for WaylandApp {
    fn source_actions(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        offer: &mut DragOffer,
        actions: DndAction,
    ) {
        debug!("Drag source actions: {:?}", actions);
        if self.drag_acceptable {
            offer.set_actions(DndAction::Copy, DndAction::Copy);
        }
    }

    fn selected_action(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _offer: &mut DragOffer,
        actions: DndAction,
    ) {
        debug!("Drag action selected: {:?}", actions);
    }
}

// The overlay never offers data, so sources are never created
impl DataSourceHandler for WaylandApp {
    fn accept_mime(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _mime: Option<String>,
    ) {
    }

    fn send_request(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _mime: String,
        _fd: WritePipe,
    ) {
    }

    fn cancelled(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _source: &WlDataSource) {}

    fn dnd_dropped(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _source: &WlDataSource) {
    }

    fn dnd_finished(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
    ) {
    }

    fn action(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _action: DndAction,
    ) {
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

// Delegate macros
delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_seat!(WaylandApp);
delegate_keyboard!(WaylandApp);
delegate_pointer!(WaylandApp);
delegate_data_device!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_registry!(WaylandApp);

/// Run the overlay until Ctrl+Q or the compositor closes it.
///
/// `position` is the initial top-left corner; None centres the window on the first output.
pub fn run(overlay: OverlayState, position: Option<(i32, i32)>, use_gpu: bool) -> Result<()> {
    info!("Connecting to Wayland display");

    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("Failed to bind layer shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;
    let data_device_manager = DataDeviceManagerState::bind(&globals, &qh)
        .context("Failed to bind data device manager")?;

    // Get the display pointer for GPU rendering
    let display_ptr = conn.backend().display_ptr() as *mut std::ffi::c_void;

    let mut app = WaylandApp {
        registry_state: RegistryState::new(&globals),
        seat_state: SeatState::new(&globals, &qh),
        output_state: OutputState::new(&globals, &qh),
        shm,
        layer_shell,
        compositor_state,
        data_device_manager,
        display_ptr,
        overlay,
        layer_surface: None,
        pool: None,
        buffer: None,
        configured: false,
        pointer_pos: (0.0, 0.0),
        ctrl_held: false,
        data_device: None,
        drag_acceptable: false,
        qh: qh.clone(),
        needs_redraw: false,
        frame_requested: false,
        last_resize_draw: None,
        use_gpu,
        gpu_renderer: None,
        gpu_initialized: false,
    };

    // Dispatch once to get output info
    event_queue.roundtrip(&mut app)?;

    let geometry = app.overlay.geometry();
    let (x, y) = match position {
        Some(pos) => pos,
        None => {
            let (display_width, display_height) = get_display_dimensions(&app.output_state);
            info!("Display dimensions: {}x{}", display_width, display_height);
            centred(display_width, display_height, geometry.width, geometry.height)
        }
    };
    app.overlay.set_position(x, y);
    let (width, height) = cap_size(geometry.width, geometry.height, MAX_SIZE);
    app.overlay.set_size(width, height);

    let surface = app.compositor_state.create_surface(&qh);
    let layer_surface = app.layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Overlay,
        Some("easy-overlay"),
        None,
    );

    layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
    layer_surface.set_margin(y, 0, 0, x);
    layer_surface.set_size(width, height);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::OnDemand);
    layer_surface.commit();

    app.layer_surface = Some(layer_surface);

    info!("Starting event loop");
    info!("Controls: drop an image onto the window, left-drag to move");
    info!("Drag the bottom-right corner to resize");
    info!("Hold left + wheel to scale, hold right + wheel to change opacity, Ctrl+Q to quit");

    loop {
        event_queue.blocking_dispatch(&mut app)?;

        if app.overlay.should_exit() {
            info!("Exiting application");
            break;
        }
    }

    Ok(())
}

/// Get display dimensions from the output state
fn get_display_dimensions(output_state: &OutputState) -> (u32, u32) {
    for output in output_state.outputs() {
        if let Some(info) = output_state.info(&output) {
            if let Some(mode) = info.modes.iter().find(|m| m.current) {
                return (mode.dimensions.0 as u32, mode.dimensions.1 as u32);
            }
            if let Some(mode) = info.modes.first() {
                return (mode.dimensions.0 as u32, mode.dimensions.1 as u32);
            }
        }
    }
    (1920, 1080)
}

/// Shrink a size to fit within `max` on both axes, keeping its aspect ratio
fn cap_size(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let shrink = |side: u32, long: u32| ((side as u64 * max as u64 / long as u64) as u32).max(1);
    if width >= height {
        (max, shrink(height, width))
    } else {
        (shrink(width, height), max)
    }
}

/// Whether enough time has passed since the last resize preview frame
fn resize_frame_due(last: Option<Instant>, now: Instant) -> bool {
    match last {
        Some(last) => now.duration_since(last).as_millis() >= MIN_RESIZE_FRAME_INTERVAL_MS,
        None => true,
    }
}

/// Top-left corner that centres a window on the display
fn centred(display_width: u32, display_height: u32, width: u32, height: u32) -> (i32, i32) {
    (
        (display_width as i32 - width as i32) / 2,
        (display_height as i32 - height as i32) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_codes() {
        assert_eq!(map_button(272), Button::Left);
        assert_eq!(map_button(273), Button::Right);
        assert_eq!(map_button(274), Button::Other(274));
    }

    #[test]
    fn capping_keeps_aspect_ratio() {
        assert_eq!(cap_size(300, 200, MAX_SIZE), (300, 200));
        assert_eq!(cap_size(8192, 1024, 4096), (4096, 512));
        assert_eq!(cap_size(1000, 6000, 4096), (682, 4096));
        assert_eq!(cap_size(5000, 5000, 4096), (4096, 4096));
        assert_eq!(cap_size(10000, 1, 4096), (4096, 1));
    }

    #[test]
    fn resize_preview_is_throttled() {
        let start = Instant::now();
        assert!(resize_frame_due(None, start));
        assert!(!resize_frame_due(Some(start), start));
        let later = start + std::time::Duration::from_millis(MIN_RESIZE_FRAME_INTERVAL_MS as u64);
        assert!(resize_frame_due(Some(start), later));
    }

    #[test]
    fn centring_allows_oversized_windows() {
        assert_eq!(centred(1920, 1080, 300, 300), (810, 390));
        assert_eq!(centred(800, 600, 1000, 700), (-100, -50));
    }
}
