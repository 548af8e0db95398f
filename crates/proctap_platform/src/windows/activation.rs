//! Per-process loopback activation via `ActivateAudioInterfaceAsync` with
//! `AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS`.
//!
//! Activation is asynchronous by design (it may prompt the user or wait on
//! the audio service), so the completion handler signals a channel the
//! caller waits on with a bounded, 2-second timeout.

use std::sync::mpsc;
use std::time::Duration;

use windows::core::{implement, Interface, Result as WinResult};
use windows::Win32::Media::Audio::{
    ActivateAudioInterfaceAsync, IActivateAudioInterfaceAsyncOperation,
    IActivateAudioInterfaceCompletionHandler, IActivateAudioInterfaceCompletionHandler_Impl,
    IAudioClient, AUDIOCLIENT_ACTIVATION_PARAMS, AUDIOCLIENT_ACTIVATION_PARAMS_0,
    AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK, AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS,
    PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE, VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
};
use windows::Win32::System::Com::StructuredStorage::PROPVARIANT;
use windows::Win32::System::Variant::VT_BLOB;

use crate::error::{PlatformError, PlatformResult};

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(2);

#[implement(IActivateAudioInterfaceCompletionHandler)]
struct CompletionHandler {
    done: mpsc::Sender<WinResult<IAudioClient>>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for CompletionHandler_Impl {
    fn ActivateCompleted(
        &self,
        operation: Option<&IActivateAudioInterfaceAsyncOperation>,
    ) -> WinResult<()> {
        let result = (|| -> WinResult<IAudioClient> {
            let operation = operation.ok_or_else(|| {
                windows::core::Error::from(windows::Win32::Foundation::E_POINTER)
            })?;
            let mut activate_result = windows::Win32::Foundation::S_OK;
            let mut interface = None;
            unsafe { operation.GetActivateResult(&mut activate_result, &mut interface)? };
            activate_result.ok()?;
            interface
                .ok_or_else(|| windows::core::Error::from(windows::Win32::Foundation::E_NOINTERFACE))?
                .cast()
        })();
        let _ = self.done.send(result);
        Ok(())
    }
}

/// Activate an `IAudioClient` scoped to `pid`'s process-loopback stream,
/// including its child processes (`PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE`).
/// Blocks the calling thread until the OS completes activation or
/// [`ACTIVATION_TIMEOUT`] elapses.
pub fn activate_process_loopback_client(pid: u32) -> PlatformResult<IAudioClient> {
    let mut params = AUDIOCLIENT_ACTIVATION_PARAMS {
        ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
        Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
            ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                TargetProcessId: pid,
                ProcessLoopbackMode: PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE,
            },
        },
    };

    let mut prop = PROPVARIANT::default();
    unsafe {
        prop.Anonymous.Anonymous.vt = VT_BLOB;
        prop.Anonymous.Anonymous.Anonymous.blob.cbSize = std::mem::size_of_val(&params) as u32;
        prop.Anonymous.Anonymous.Anonymous.blob.pBlobData = &mut params as *mut _ as *mut u8;
    }

    let (tx, rx) = mpsc::channel();
    let handler: IActivateAudioInterfaceCompletionHandler =
        CompletionHandler { done: tx }.into();

    unsafe {
        ActivateAudioInterfaceAsync(
            VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
            &IAudioClient::IID,
            Some(&prop),
            &handler,
        )
        .map_err(|e| PlatformError::Internal(format!("ActivateAudioInterfaceAsync failed: {e}")))?;
    }

    match rx.recv_timeout(ACTIVATION_TIMEOUT) {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(PlatformError::Internal(format!("process-loopback activation failed: {e}"))),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(PlatformError::Unavailable("process-loopback activation timed out after 2s".into()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(PlatformError::Internal("activation completion handler dropped without signaling".into()))
        }
    }
}
