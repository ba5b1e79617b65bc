//! Accessibility trust check
//!
//! An active HID event tap needs the Accessibility permission. macOS can be
//! asked to show its own prompt; the user then has to restart the daemon.

#[cfg(target_os = "macos")]
mod platform {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::string::{CFString, CFStringRef};

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        static kAXTrustedCheckOptionPrompt: CFStringRef;
        fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
    }

    pub fn is_process_trusted(prompt: bool) -> bool {
        let key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
        let value = CFBoolean::from(prompt);
        let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

        unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) }
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    pub fn is_process_trusted(_prompt: bool) -> bool {
        true
    }
}

/// Whether this process may install an active event tap.
///
/// With `prompt` set, macOS shows its permission dialog when the answer is
/// no. Other platforms have no such permission and always report trusted.
pub fn is_process_trusted(prompt: bool) -> bool {
    platform::is_process_trusted(prompt)
}
