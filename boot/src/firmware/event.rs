//! event.rs — EVT_SIGNAL_EXIT_BOOT_SERVICES
//!
//! The arbiter is boxed and leaked into the event context; the firmware
//! hands it back to `exit_boot_services` exactly when boot services end.

use alloc::boxed::Box;
use core::ffi::c_void;
use core::ptr::NonNull;

use log::info;
use uefi::table::boot::{BootServices, EventType, Tpl};
use uefi::Event;

use super::directory::FirmwareDirectory;
use super::status_of;
use crate::arbiter::{Arbiter, ExitBootServicesEvents};
use crate::error::LoaderError;

type FirmwareArbiter = Arbiter<FirmwareDirectory>;

pub struct ExitHook<'a> {
    bt: &'a BootServices,
    registered: bool,
}

impl<'a> ExitHook<'a> {
    pub fn new(bt: &'a BootServices) -> Self {
        Self { bt, registered: false }
    }
}

impl ExitBootServicesEvents<FirmwareDirectory> for ExitHook<'_> {
    fn register(&mut self, arbiter: FirmwareArbiter) -> Result<(), LoaderError> {
        if self.registered {
            return Err(LoaderError::AlreadyRegistered);
        }

        let context = NonNull::from(Box::leak(Box::new(arbiter)));
        // SAFETY: `exit_boot_services` only ever sees this context, which
        // stays allocated until boot services are gone.
        let event = unsafe {
            self.bt.create_event(
                EventType::SIGNAL_EXIT_BOOT_SERVICES,
                Tpl::CALLBACK,
                Some(exit_boot_services),
                Some(context.cast::<c_void>()),
            )
        };

        match event {
            Ok(_) => {
                self.registered = true;
                info!("ExitBootServices hook armed");
                Ok(())
            }
            Err(e) => {
                // SAFETY: the firmware never saw the context.
                drop(unsafe { Box::from_raw(context.as_ptr()) });
                Err(LoaderError::Firmware { status: status_of(&e) })
            }
        }
    }
}

unsafe extern "efiapi" fn exit_boot_services(_event: Event, context: Option<NonNull<c_void>>) {
    if let Some(context) = context {
        let arbiter = &mut *context.cast::<FirmwareArbiter>().as_ptr();
        arbiter.on_exit_boot_services();
    }
}
