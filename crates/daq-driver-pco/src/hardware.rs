//! PCO SC2 SDK binding (`pco_sdk` feature, Windows only).
//!
//! Wraps the `SC2_Cam` exports from `pco-sys` behind [`PcoSdk`]. Calls are
//! serialized through a process-wide lock because the SDK shares state
//! between handles. Event waits run outside the lock so that a blocked wait
//! cannot stall other cameras.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::{self, NonNull};

use parking_lot::Mutex;
use pco_sys as sys;
use tracing::info;

use crate::sdk::{
    AllocatedBuffer, BufferAddress, BufferStatus, CameraDescription, CameraHandle, ErrorCode,
    EventHandle, PcoSdk, RawDelayExposure, RawFrameRate, SdkResult, Sizes, TransferParameters,
    WaitOutcome,
};

/// Serializes every SC2_Cam call.
static FFI_LOCK: Mutex<()> = Mutex::new(());

/// `AllocateBuffer` reported success but returned no address.
const NULL_BUFFER: ErrorCode = 0x8000_0008;
/// `ResetEvent` failed at the OS level.
const RESET_EVENT_FAILED: ErrorCode = sys::WAIT_FAILED;

const ERROR_TEXT_LEN: usize = 500;

/// The installed PCO SDK.
#[derive(Debug, Default)]
pub struct Sc2Sdk {
    _private: (),
}

impl Sc2Sdk {
    /// Use the SDK linked into this process.
    pub fn new() -> Self {
        info!("Using PCO SC2 SDK");
        Self::default()
    }
}

fn check(status: c_int) -> SdkResult<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(status as ErrorCode)
    }
}

fn raw(handle: CameraHandle) -> sys::HANDLE {
    handle.0 as sys::HANDLE
}

/// Run `f` with the FFI lock held.
fn with_ffi<R>(f: impl FnOnce() -> R) -> R {
    let _guard = FFI_LOCK.lock();
    f()
}

impl PcoSdk for Sc2Sdk {
    fn open_camera(&mut self, camera_number: u16) -> SdkResult<CameraHandle> {
        let mut open = sys::PCO_OpenStruct {
            wCameraNumber: camera_number,
            ..Default::default()
        };
        let mut handle: sys::HANDLE = ptr::null_mut();
        // SAFETY: both out-pointers reference live locals; `open.wSize` is set.
        check(with_ffi(|| unsafe { sys::PCO_OpenCameraEx(&mut handle, &mut open) }))?;
        Ok(CameraHandle(handle as usize))
    }

    fn close_camera(&mut self, handle: CameraHandle) -> SdkResult<()> {
        // SAFETY: `handle` came from PCO_OpenCameraEx; the connection closes
        // it once.
        check(with_ffi(|| unsafe { sys::PCO_CloseCamera(raw(handle)) }))
    }

    fn camera_description(&mut self, handle: CameraHandle) -> SdkResult<CameraDescription> {
        let mut d = sys::PCO_Description::default();
        // SAFETY: `d` is a live, size-tagged description block.
        check(with_ffi(|| unsafe {
            sys::PCO_GetCameraDescription(raw(handle), &mut d)
        }))?;
        Ok(CameraDescription {
            sensor_type: d.wSensorTypeDESC,
            max_width: d.wMaxHorzResStdDESC,
            max_height: d.wMaxVertResStdDESC,
            dynamic_resolution: d.wDynResDESC,
            max_bin_horizontal: d.wMaxBinHorzDESC,
            max_bin_vertical: d.wMaxBinVertDESC,
            roi_hstep: d.wRoiHorStepsDESC,
            roi_vstep: d.wRoiVertStepsDESC,
            num_adcs: d.wNumADCsDESC,
            pattern_type: d.wPatternTypeDESC,
            general_caps1: d.dwGeneralCapsDESC1,
            pixel_rates: d.dwPixelRateDESC,
        })
    }

    fn sizes(&mut self, handle: CameraHandle) -> SdkResult<Sizes> {
        let (mut width, mut height, mut max_width, mut max_height) = (0, 0, 0, 0);
        // SAFETY: out-pointers reference live locals.
        check(with_ffi(|| unsafe {
            sys::PCO_GetSizes(
                raw(handle),
                &mut width,
                &mut height,
                &mut max_width,
                &mut max_height,
            )
        }))?;
        Ok(Sizes {
            width,
            height,
            max_width,
            max_height,
        })
    }

    fn set_roi(&mut self, handle: CameraHandle, x0: u16, y0: u16, x1: u16, y1: u16) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe { sys::PCO_SetROI(raw(handle), x0, y0, x1, y1) }))
    }

    fn roi(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16, u16, u16)> {
        let (mut x0, mut y0, mut x1, mut y1) = (0, 0, 0, 0);
        // SAFETY: out-pointers reference live locals.
        check(with_ffi(|| unsafe {
            sys::PCO_GetROI(raw(handle), &mut x0, &mut y0, &mut x1, &mut y1)
        }))?;
        Ok((x0, y0, x1, y1))
    }

    fn set_binning(&mut self, handle: CameraHandle, horizontal: u16, vertical: u16) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe {
            sys::PCO_SetBinning(raw(handle), horizontal, vertical)
        }))
    }

    fn binning(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16)> {
        let (mut horizontal, mut vertical) = (0, 0);
        // SAFETY: out-pointers reference live locals.
        check(with_ffi(|| unsafe {
            sys::PCO_GetBinning(raw(handle), &mut horizontal, &mut vertical)
        }))?;
        Ok((horizontal, vertical))
    }

    fn set_delay_exposure(&mut self, handle: CameraHandle, value: RawDelayExposure) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe {
            sys::PCO_SetDelayExposureTime(
                raw(handle),
                value.delay,
                value.exposure,
                value.delay_timebase,
                value.exposure_timebase,
            )
        }))
    }

    fn delay_exposure(&mut self, handle: CameraHandle) -> SdkResult<RawDelayExposure> {
        let mut v = RawDelayExposure::default();
        // SAFETY: out-pointers reference fields of a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_GetDelayExposureTime(
                raw(handle),
                &mut v.delay,
                &mut v.exposure,
                &mut v.delay_timebase,
                &mut v.exposure_timebase,
            )
        }))?;
        Ok(v)
    }

    fn set_frame_rate(
        &mut self,
        handle: CameraHandle,
        mode: u16,
        rate_mhz: u32,
        exposure_ns: u32,
    ) -> SdkResult<RawFrameRate> {
        let mut v = RawFrameRate {
            status: 0,
            rate_mhz,
            exposure_ns,
        };
        // SAFETY: in/out pointers reference fields of a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_SetFrameRate(
                raw(handle),
                &mut v.status,
                mode,
                &mut v.rate_mhz,
                &mut v.exposure_ns,
            )
        }))?;
        Ok(v)
    }

    fn frame_rate(&mut self, handle: CameraHandle) -> SdkResult<RawFrameRate> {
        let mut v = RawFrameRate::default();
        // SAFETY: out-pointers reference fields of a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_GetFrameRate(raw(handle), &mut v.status, &mut v.rate_mhz, &mut v.exposure_ns)
        }))?;
        Ok(v)
    }

    fn arm(&mut self, handle: CameraHandle) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe { sys::PCO_ArmCamera(raw(handle)) }))
    }

    fn set_recording_state(&mut self, handle: CameraHandle, recording: bool) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe {
            sys::PCO_SetRecordingState(raw(handle), u16::from(recording))
        }))
    }

    fn recording_state(&mut self, handle: CameraHandle) -> SdkResult<bool> {
        let mut state = 0;
        // SAFETY: out-pointer references a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_GetRecordingState(raw(handle), &mut state)
        }))?;
        Ok(state != 0)
    }

    fn set_trigger_mode(&mut self, handle: CameraHandle, mode: u16) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe { sys::PCO_SetTriggerMode(raw(handle), mode) }))
    }

    fn trigger_mode(&mut self, handle: CameraHandle) -> SdkResult<u16> {
        let mut mode = 0;
        // SAFETY: out-pointer references a live local.
        check(with_ffi(|| unsafe { sys::PCO_GetTriggerMode(raw(handle), &mut mode) }))?;
        Ok(mode)
    }

    fn force_trigger(&mut self, handle: CameraHandle) -> SdkResult<bool> {
        let mut triggered = 0;
        // SAFETY: out-pointer references a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_ForceTrigger(raw(handle), &mut triggered)
        }))?;
        Ok(triggered != 0)
    }

    fn pixel_rate(&mut self, handle: CameraHandle) -> SdkResult<u32> {
        let mut rate = 0;
        // SAFETY: out-pointer references a live local.
        check(with_ffi(|| unsafe { sys::PCO_GetPixelRate(raw(handle), &mut rate) }))?;
        Ok(rate)
    }

    fn transfer_parameters(&mut self, handle: CameraHandle) -> SdkResult<TransferParameters> {
        let mut p = sys::PCO_SC2_CL_TRANSFER_PARAM::default();
        let len = std::mem::size_of::<sys::PCO_SC2_CL_TRANSFER_PARAM>() as c_int;
        // SAFETY: `p` is a live repr(C) block of exactly `len` bytes.
        check(with_ffi(|| unsafe {
            sys::PCO_GetTransferParameter(raw(handle), ptr::addr_of_mut!(p).cast::<c_void>(), len)
        }))?;
        Ok(TransferParameters {
            baudrate: p.baudrate,
            clock_frequency: p.ClockFrequency,
            cc_line: p.CCline,
            data_format: p.DataFormat,
            transmit: p.Transmit,
        })
    }

    fn set_transfer_parameters_auto(&mut self, handle: CameraHandle) -> SdkResult<()> {
        // SAFETY: a null buffer of length 0 is the documented "auto" form.
        check(with_ffi(|| unsafe {
            sys::PCO_SetTransferParametersAuto(raw(handle), ptr::null_mut(), 0)
        }))
    }

    fn set_image_parameters(&mut self, handle: CameraHandle, width: u16, height: u16) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe {
            sys::PCO_CamLinkSetImageParameters(raw(handle), width, height)
        }))
    }

    fn allocate_buffer(&mut self, handle: CameraHandle, size: u32) -> SdkResult<AllocatedBuffer> {
        let mut index = sys::PCO_NEW_BUFFER;
        let mut address: *mut u16 = ptr::null_mut();
        let mut event: sys::HANDLE = ptr::null_mut();
        // SAFETY: out-pointers reference live locals; the SDK owns the
        // returned memory and event until PCO_FreeBuffer.
        check(with_ffi(|| unsafe {
            sys::PCO_AllocateBuffer(raw(handle), &mut index, size, &mut address, &mut event)
        }))?;
        let address = NonNull::new(address).ok_or(NULL_BUFFER)?;
        Ok(AllocatedBuffer {
            index,
            address: BufferAddress::new(address),
            event: EventHandle(event as usize),
        })
    }

    fn free_buffer(&mut self, handle: CameraHandle, index: i16) -> SdkResult<()> {
        // SAFETY: value-only call; callers cancel the queue first.
        check(with_ffi(|| unsafe { sys::PCO_FreeBuffer(raw(handle), index) }))
    }

    fn add_buffer(
        &mut self,
        handle: CameraHandle,
        index: i16,
        width: u16,
        height: u16,
        depth: u16,
    ) -> SdkResult<()> {
        // SAFETY: value-only call; `index` names a buffer allocated on this
        // handle.
        check(with_ffi(|| unsafe {
            sys::PCO_AddBufferEx(raw(handle), 0, 0, index, width, height, depth)
        }))
    }

    fn cancel_images(&mut self, handle: CameraHandle) -> SdkResult<()> {
        // SAFETY: value-only call on an open handle.
        check(with_ffi(|| unsafe { sys::PCO_CancelImages(raw(handle)) }))
    }

    fn buffer_status(&mut self, handle: CameraHandle, index: i16) -> SdkResult<BufferStatus> {
        let mut status = BufferStatus::default();
        // SAFETY: out-pointers reference fields of a live local.
        check(with_ffi(|| unsafe {
            sys::PCO_GetBufferStatus(raw(handle), index, &mut status.dll, &mut status.driver)
        }))?;
        Ok(status)
    }

    fn wait_event(&mut self, event: EventHandle, timeout_ms: u32) -> WaitOutcome {
        // SAFETY: `event` is the SDK-owned event of an allocated buffer.
        match unsafe { sys::WaitForSingleObject(event.0 as sys::HANDLE, timeout_ms) } {
            sys::WAIT_OBJECT_0 => WaitOutcome::Signaled,
            sys::WAIT_TIMEOUT => WaitOutcome::TimedOut,
            _ => WaitOutcome::Failed,
        }
    }

    fn reset_event(&mut self, event: EventHandle) -> SdkResult<()> {
        // SAFETY: `event` is the SDK-owned event of an allocated buffer.
        if unsafe { sys::ResetEvent(event.0 as sys::HANDLE) } != 0 {
            Ok(())
        } else {
            Err(RESET_EVENT_FAILED)
        }
    }

    fn error_text(&self, code: ErrorCode) -> String {
        let mut text = [0 as c_char; ERROR_TEXT_LEN];
        // SAFETY: the SDK writes at most `ERROR_TEXT_LEN - 1` bytes, so the
        // final zero always terminates the string.
        unsafe {
            with_ffi(|| {
                sys::PCO_GetErrorTextSDK(code, text.as_mut_ptr(), (ERROR_TEXT_LEN - 1) as u32);
            });
            CStr::from_ptr(text.as_ptr()).to_string_lossy().into_owned()
        }
    }
}
