//! Abyss Slide entry point
//!
//! Handles platform-specific initialization and runs the game loop.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, HtmlCanvasElement, KeyboardEvent, MouseEvent};

    use abyss_slide::audio::AudioManager;
    use abyss_slide::persistence::LocalStorageStore;
    use abyss_slide::platform::{FrameRequest, FrameScheduler, InputEvent, Key};
    use abyss_slide::renderer::CanvasRenderer;
    use abyss_slide::services::{AudioSink, HudEvent, HudSink, LogHud, Services, SilentAudio};
    use abyss_slide::sim::LevelCatalog;
    use abyss_slide::sim::levels::DEFAULT_LEVEL_SEED;
    use abyss_slide::settings::QualityPreset;
    use abyss_slide::{GameConfig, Settings, SimulationLoop};

    type Sim = Rc<RefCell<SimulationLoop>>;
    type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

    /// requestAnimationFrame-backed scheduler. The callback is installed once
    /// the loop exists, since it needs a handle to it.
    struct WebScheduler {
        callback: FrameCallback,
    }

    impl FrameScheduler for WebScheduler {
        fn request_frame(&mut self) -> FrameRequest {
            let id = match (web_sys::window(), self.callback.borrow().as_ref()) {
                (Some(window), Some(callback)) => window
                    .request_animation_frame(callback.as_ref().unchecked_ref())
                    .unwrap_or_else(|e| {
                        log::error!("requestAnimationFrame failed: {:?}", e);
                        0
                    }),
                _ => 0,
            };
            FrameRequest(id)
        }

        fn cancel_frame(&mut self, request: FrameRequest) {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(request.0);
            }
        }
    }

    /// Mirrors HUD events into the page and the log
    struct DomHud {
        document: Document,
    }

    impl DomHud {
        fn set_text(&self, selector: &str, text: &str) {
            if let Some(el) = self.document.query_selector(selector).ok().flatten() {
                el.set_text_content(Some(text));
            }
        }
    }

    impl HudSink for DomHud {
        fn notify(&mut self, event: HudEvent) {
            match &event {
                HudEvent::LevelStarted { level, name } => {
                    self.set_text("#hud-level .hud-value", &format!("{} - {}", level, name));
                    self.set_text("#hud-message", "");
                }
                HudEvent::LevelComplete(report) => {
                    let stars = "*".repeat(usize::from(report.stars));
                    self.set_text(
                        "#hud-message",
                        &format!("Level complete {} - press N for the next dive", stars),
                    );
                    self.set_text("#hud-score .hud-value", &report.score.to_string());
                }
                HudEvent::OutOfMoves { .. } => {
                    self.set_text("#hud-message", "Out of moves - Z to undo");
                }
                HudEvent::Hint(text) => self.set_text("#hud-message", text),
                HudEvent::FishCaught { points, .. } => {
                    self.set_text("#hud-message", &format!("+{}", points));
                }
            }
            LogHud.notify(event);
        }
    }

    fn js_err(e: impl std::fmt::Display) -> JsValue {
        JsValue::from_str(&e.to_string())
    }

    pub fn run() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).map_err(js_err)?;

        log::info!("Abyss Slide starting...");

        let window = web_sys::window().ok_or("no window")?;
        let document = window.document().ok_or("no document")?;

        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .ok_or("no canvas")?
            .dyn_into()?;

        let dpr = window.device_pixel_ratio();
        canvas.set_width((f64::from(canvas.client_width()) * dpr) as u32);
        canvas.set_height((f64::from(canvas.client_height()) * dpr) as u32);

        let mut settings = Settings::load();
        // `?quality=low|medium|high` picks a preset and remembers it
        let query = window.location().search().unwrap_or_default();
        let requested = query
            .trim_start_matches('?')
            .split('&')
            .find_map(|pair| pair.strip_prefix("quality="))
            .and_then(QualityPreset::parse);
        if let Some(preset) = requested {
            settings.apply_preset(preset);
            settings.save();
            log::info!("Quality preset: {}", preset.as_str());
        }
        let seed = js_sys::Date::now() as u64;
        let config = GameConfig::from_settings(&settings, seed);

        let levels =
            LevelCatalog::builtin(DEFAULT_LEVEL_SEED).with_store(Box::new(LocalStorageStore));
        let audio = AudioManager::from_settings(&settings);
        let audio: Box<dyn AudioSink> = if audio.is_available() {
            Box::new(audio)
        } else {
            Box::new(SilentAudio)
        };
        let services = Services::new(Box::new(levels))
            .with_audio(audio)
            .with_hud(Box::new(DomHud {
                document: document.clone(),
            }));

        let mut renderer = CanvasRenderer::new(canvas.clone()).map_err(js_err)?;
        renderer.set_show_fps(settings.show_fps);

        let callback: FrameCallback = Rc::new(RefCell::new(None));
        let scheduler = WebScheduler {
            callback: callback.clone(),
        };

        let sim = SimulationLoop::new(config, services, Box::new(renderer), Box::new(scheduler))
            .map_err(js_err)?;
        let sim: Sim = Rc::new(RefCell::new(sim));
        log::info!("Simulation initialized with seed: {}", seed);

        {
            let sim = sim.clone();
            *callback.borrow_mut() = Some(Closure::<dyn FnMut(f64)>::new(move |time: f64| {
                if let Ok(mut s) = sim.try_borrow_mut() {
                    s.tick(time);
                }
            }));
        }

        setup_input_handlers(&canvas, &document, sim.clone())?;
        setup_lifecycle(&document, sim.clone())?;

        if let Some(hud) = document.get_element_by_id("hud") {
            let _ = hud.set_attribute("class", "");
        }

        sim.borrow_mut().start();
        log::info!("Abyss Slide running!");
        Ok(())
    }

    fn dispatch(sim: &Sim, event: InputEvent) {
        if let Ok(mut s) = sim.try_borrow_mut() {
            s.handle_input(event);
        }
    }

    fn setup_input_handlers(
        canvas: &HtmlCanvasElement,
        document: &Document,
        sim: Sim,
    ) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or("no window")?;

        // Pointer lock gates mouse-look
        {
            let sim = sim.clone();
            let doc = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                let locked = doc.pointer_lock_element().is_some();
                log::info!("Pointer lock {}", if locked { "acquired" } else { "released" });
                dispatch(&sim, InputEvent::PointerCapture(locked));
            });
            document.add_event_listener_with_callback(
                "pointerlockchange",
                closure.as_ref().unchecked_ref(),
            )?;
            closure.forget();
        }

        {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                log::error!("Pointer lock error!");
            });
            document.add_event_listener_with_callback(
                "pointerlockerror",
                closure.as_ref().unchecked_ref(),
            )?;
            closure.forget();
        }

        // Page UI announces its dialogs with plain events on the document
        for (name, open) in [("modal-open", true), ("modal-close", false)] {
            let sim = sim.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                dispatch(&sim, InputEvent::ModalChanged(open));
            });
            document.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        {
            let sim = sim.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                dispatch(
                    &sim,
                    InputEvent::PointerMove {
                        dx: event.movement_x() as f32,
                        dy: event.movement_y() as f32,
                    },
                );
            });
            canvas.add_event_listener_with_callback("mousemove", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // First click captures the pointer, later clicks pick along the view ray
        {
            let sim = sim.clone();
            let canvas_clone = canvas.clone();
            let doc = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
                if doc.pointer_lock_element().is_none() {
                    canvas_clone.request_pointer_lock();
                    return;
                }
                dispatch(&sim, InputEvent::PointerDown(None));
            });
            canvas.add_event_listener_with_callback("mousedown", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        for (name, down) in [("keydown", true), ("keyup", false)] {
            let sim = sim.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                // Held keys repeat; intents are level-triggered already
                if event.repeat() {
                    return;
                }
                let Some(key) = Key::from_code(&event.code()) else {
                    return;
                };
                if key == Key::Up {
                    event.prevent_default();
                }
                let input = if down {
                    InputEvent::KeyDown(key)
                } else {
                    InputEvent::KeyUp(key)
                };
                dispatch(&sim, input);
            });
            window.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        Ok(())
    }

    fn setup_lifecycle(document: &Document, sim: Sim) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or("no window")?;

        for (name, focused) in [("blur", false), ("focus", true)] {
            let sim = sim.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                if let Ok(mut s) = sim.try_borrow_mut() {
                    s.set_focused(focused);
                }
            });
            window.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // Hidden tabs get no frames; stop so the first frame back has no backlog
        {
            let sim = sim.clone();
            let doc = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                let Ok(mut s) = sim.try_borrow_mut() else {
                    return;
                };
                if doc.visibility_state() == web_sys::VisibilityState::Hidden {
                    s.stop();
                } else {
                    s.start();
                }
            });
            document.add_event_listener_with_callback(
                "visibilitychange",
                closure.as_ref().unchecked_ref(),
            )?;
            closure.forget();
        }

        {
            let sim = sim.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                let Some(window) = web_sys::window() else {
                    return;
                };
                let Some(canvas) = window
                    .document()
                    .and_then(|d| d.get_element_by_id("canvas"))
                    .and_then(|el| el.dyn_into::<HtmlCanvasElement>().ok())
                else {
                    return;
                };
                let dpr = window.device_pixel_ratio();
                let width = (f64::from(canvas.client_width()) * dpr) as u32;
                let height = (f64::from(canvas.client_height()) * dpr) as u32;
                if let Ok(mut s) = sim.try_borrow_mut() {
                    s.resize(width, height);
                }
            });
            window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() -> Result<(), JsValue> {
    wasm_game::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main
}

/// Headless run: simulate a few seconds and report what happened
#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use abyss_slide::platform::ManualScheduler;
    use abyss_slide::renderer::HeadlessRenderer;
    use abyss_slide::services::Services;
    use abyss_slide::sim::LevelCatalog;
    use abyss_slide::sim::levels::DEFAULT_LEVEL_SEED;
    use abyss_slide::settings::QualityPreset;
    use abyss_slide::{Axis, GameConfig, Settings, SimulationLoop};

    env_logger::init();
    log::info!("Abyss Slide (native) starting...");

    // abyss-slide [frames] [low|medium|high]
    let args: Vec<String> = std::env::args().collect();
    let frames: u32 = args.get(1).and_then(|arg| arg.parse().ok()).unwrap_or(600);

    let mut settings = Settings::load();
    if let Some(preset) = args.get(2).and_then(|arg| QualityPreset::parse(arg)) {
        settings.apply_preset(preset);
    }
    log::info!(
        "Quality {}: {} fish, {:?} neighbour search",
        settings.quality.as_str(),
        settings.fish_count,
        settings.neighbor_search
    );
    let config = GameConfig::from_settings(&settings, DEFAULT_LEVEL_SEED);
    let scheduler = ManualScheduler::new();
    let services = Services::new(Box::new(LevelCatalog::builtin(DEFAULT_LEVEL_SEED)));
    let mut sim = match SimulationLoop::new(
        config,
        services,
        Box::new(HeadlessRenderer::default()),
        Box::new(scheduler.clone()),
    ) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    // One opening move so the run exercises the puzzle as well
    sim.select_row(Axis::Z, 0);
    sim.slide(1);

    sim.start();
    let mut now = 0.0;
    for _ in 0..frames {
        if scheduler.fire().is_none() || !sim.tick(now) {
            break;
        }
        now += 1000.0 / 60.0;
    }
    sim.stop();

    let session = sim.puzzle().session();
    log::info!(
        "Ran {} frames ({} physics steps): level {:?}, phase {:?}, score {}, {} fish, {} fault(s)",
        sim.frames(),
        sim.world().step_count(),
        session.map(|s| s.level),
        sim.puzzle().phase(),
        session.map_or(0, |s| s.score),
        sim.flock().len(),
        sim.faults().total()
    );
}
