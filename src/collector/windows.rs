//! Windows key capture using a low-level keyboard hook, and focus polling
//! through the foreground window.

use crate::collector::types::{
    CollectorConfig, CollectorError, FocusSource, KeyEvent, KeySymbol, NamedKey,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::error;
use ::windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use ::windows::Win32::System::Threading::GetCurrentThreadId;
use ::windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetForegroundWindow, GetMessageW, GetWindowTextLengthW, GetWindowTextW,
    PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
};

/// The Windows key collector using a low-level keyboard hook.
pub struct WindowsCollector {
    sender: Sender<KeyEvent>,
    receiver: Receiver<KeyEvent>,
    running: Arc<AtomicBool>,
    hook_thread_id: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WindowsCollector {
    /// Create a new Windows collector with the given configuration.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity);

        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            hook_thread_id: Arc::new(AtomicU32::new(0)),
            thread_handle: None,
        }
    }

    /// Start capturing key presses in a background thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let thread_id = self.hook_thread_id.clone();

        let handle = thread::Builder::new()
            .name("key-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_hook_loop(sender, running.clone(), thread_id) {
                    error!("key capture stopped: {e}");
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| CollectorError::HookInstallationFailed)?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing key presses.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        // GetMessageW blocks; wake the hook thread with WM_QUIT.
        let thread_id = self.hook_thread_id.load(Ordering::SeqCst);
        if thread_id != 0 {
            unsafe {
                let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for key events.
    pub fn receiver(&self) -> &Receiver<KeyEvent> {
        &self.receiver
    }

    /// A sender into the collector's channel.
    pub fn sender(&self) -> Sender<KeyEvent> {
        self.sender.clone()
    }
}

impl Drop for WindowsCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

// Hook callbacks run on the thread that installed them.
thread_local! {
    static EVENT_SENDER: std::cell::RefCell<Option<Sender<KeyEvent>>> = const { std::cell::RefCell::new(None) };
}

/// Low-level keyboard hook callback.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 && matches!(w_param.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN) {
        let kb_struct = &*(l_param.0 as *const KBDLLHOOKSTRUCT);

        if let Some(key) = key_symbol_for_vk(kb_struct.vkCode) {
            EVENT_SENDER.with(|sender| {
                if let Some(ref s) = *sender.borrow() {
                    let _ = s.try_send(KeyEvent::new(key));
                }
            });
        }
    }

    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// Map a virtual-key code to a key symbol. Letters map to lowercase.
fn key_symbol_for_vk(vk: u32) -> Option<KeySymbol> {
    match vk {
        0x41..=0x5A => char::from_u32(vk + 0x20).map(KeySymbol::Char),
        0x30..=0x39 => char::from_u32(vk).map(KeySymbol::Char),
        0x08 => Some(KeySymbol::Named(NamedKey::Backspace)),
        0x09 => Some(KeySymbol::Named(NamedKey::Tab)),
        0x0D => Some(KeySymbol::Named(NamedKey::Enter)),
        0x1B => Some(KeySymbol::Named(NamedKey::Escape)),
        0x20 => Some(KeySymbol::Named(NamedKey::Space)),
        _ => None,
    }
}

/// Run the Windows hook message loop.
fn run_hook_loop(
    sender: Sender<KeyEvent>,
    running: Arc<AtomicBool>,
    thread_id: Arc<AtomicU32>,
) -> Result<(), CollectorError> {
    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = Some(sender);
    });

    unsafe {
        thread_id.store(GetCurrentThreadId(), Ordering::SeqCst);

        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0)
            .map_err(|_| CollectorError::HookInstallationFailed)?;

        let mut msg = MSG::default();
        while running.load(Ordering::SeqCst) {
            // 0 is WM_QUIT, negative is an error
            if GetMessageW(&mut msg, HWND::default(), 0, 0).0 <= 0 {
                break;
            }
        }

        let _ = UnhookWindowsHookEx(hook);
    }

    thread_id.store(0, Ordering::SeqCst);
    Ok(())
}

/// Focus source backed by the foreground window title.
#[derive(Debug, Default)]
pub struct WindowsFocusSource;

impl WindowsFocusSource {
    pub fn new() -> Self {
        Self
    }
}

impl FocusSource for WindowsFocusSource {
    fn active_window_title(&mut self) -> Option<String> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return None;
            }

            let len = GetWindowTextLengthW(hwnd);
            if len <= 0 {
                return None;
            }

            let mut buf = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd, &mut buf);
            if copied <= 0 {
                return None;
            }
            Some(String::from_utf16_lossy(&buf[..copied as usize]))
        }
    }
}

/// Check if a low-level keyboard hook can be installed.
pub fn check_permission() -> bool {
    unsafe {
        match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) {
            Ok(hook) => {
                let _ = UnhookWindowsHookEx(hook);
                true
            }
            Err(_) => false,
        }
    }
}
