//! Low-level FFI bindings for the PCO SC2 camera SDK.
//!
//! This crate provides raw, unsafe declarations for the subset of
//! `SC2_Cam` used by the acquisition pipeline in `daq-driver-pco`, plus the
//! two Win32 event primitives the SDK hands out for buffer completion.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-pco` crate instead.
//!
//! # Features
//!
//! - `pco-sdk`: Declare and link the SDK entry points. Without this feature
//!   only the structures and constants are available, which is enough for
//!   cross-compilation and for the mock driver.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]

use std::os::raw::{c_char, c_int, c_void};

pub type WORD = u16;
pub type SHORT = i16;
pub type DWORD = u32;
pub type BOOL = c_int;
pub type HANDLE = *mut c_void;

// ============================================================================
// Structures (SC2_SDKStructures.h)
// ============================================================================

/// Input/output block of `PCO_OpenCameraEx`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PCO_OpenStruct {
    pub wSize: WORD,
    pub wInterfaceType: WORD,
    pub wCameraNumber: WORD,
    pub wCameraNumAtInterface: WORD,
    pub wOpenFlags: [WORD; 10],
    pub dwOpenFlags: [DWORD; 5],
    pub wOpenPtr: [*mut c_void; 6],
    pub zzwDummy: [WORD; 8],
}

impl Default for PCO_OpenStruct {
    fn default() -> Self {
        Self {
            wSize: std::mem::size_of::<Self>() as WORD,
            wInterfaceType: PCO_INTERFACE_ANY,
            wCameraNumber: 0,
            wCameraNumAtInterface: 0,
            wOpenFlags: [0; 10],
            dwOpenFlags: [0; 5],
            wOpenPtr: [std::ptr::null_mut(); 6],
            zzwDummy: [0; 8],
        }
    }
}

/// Static capabilities of a camera model (`PCO_GetCameraDescription`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PCO_Description {
    pub wSize: WORD,
    pub wSensorTypeDESC: WORD,
    pub wSensorSubTypeDESC: WORD,
    pub wMaxHorzResStdDESC: WORD,
    pub wMaxVertResStdDESC: WORD,
    pub wMaxHorzResExtDESC: WORD,
    pub wMaxVertResExtDESC: WORD,
    pub wDynResDESC: WORD,
    pub wMaxBinHorzDESC: WORD,
    pub wBinHorzSteppingDESC: WORD,
    pub wMaxBinVertDESC: WORD,
    pub wBinVertSteppingDESC: WORD,
    pub wRoiHorStepsDESC: WORD,
    pub wRoiVertStepsDESC: WORD,
    pub wNumADCsDESC: WORD,
    pub wMinSizeHorzDESC: WORD,
    pub dwPixelRateDESC: [DWORD; 4],
    pub ZZdwDummypr: [DWORD; 20],
    pub wConvFactDESC: [WORD; 4],
    pub sCoolingSetpoints: [SHORT; 10],
    pub ZZdwDummycv: [DWORD; 8],
    pub wSoftRoiHozStepsDESC: WORD,
    pub wSoftRoiVertStepsDESC: WORD,
    pub wIRDESC: WORD,
    pub wMinSizeVertDESC: WORD,
    pub dwMinDelayDESC: DWORD,
    pub dwMaxDelayDESC: DWORD,
    pub dwMinDelayStepDESC: DWORD,
    pub dwMinExposureDESC: DWORD,
    pub dwMaxExposureDESC: DWORD,
    pub dwMinExposureStepDESC: DWORD,
    pub dwMinDelayIRDESC: DWORD,
    pub dwMaxDelayIRDESC: DWORD,
    pub dwMinExposureIRDESC: DWORD,
    pub dwMaxExposureIRDESC: DWORD,
    pub wTimeTableDESC: WORD,
    pub wDoubleImageDESC: WORD,
    pub sMinCoolSetDESC: SHORT,
    pub sMaxCoolSetDESC: SHORT,
    pub sDefaultCoolSetDESC: SHORT,
    pub wPowerDownModeDESC: WORD,
    pub wOffsetRegulationDESC: WORD,
    pub wColorPatternDESC: WORD,
    pub wPatternTypeDESC: WORD,
    pub wDummy1: WORD,
    pub wDummy2: WORD,
    pub wNumCoolingSetpoints: WORD,
    pub dwGeneralCapsDESC1: DWORD,
    pub dwGeneralCapsDESC2: DWORD,
    pub dwExtSyncFrequency: [DWORD; 4],
    pub dwGeneralCapsDESC3: DWORD,
    pub dwGeneralCapsDESC4: DWORD,
    pub ZZdwDummy: [DWORD; 40],
}

impl Default for PCO_Description {
    fn default() -> Self {
        // SAFETY: plain-old-data of integers and integer arrays; all-zero is valid.
        #[allow(unsafe_code)]
        let mut desc: Self = unsafe { std::mem::zeroed() };
        desc.wSize = std::mem::size_of::<Self>() as WORD;
        desc
    }
}

/// Camera Link transfer parameters (`PCO_GetTransferParameter`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PCO_SC2_CL_TRANSFER_PARAM {
    pub baudrate: DWORD,
    pub ClockFrequency: DWORD,
    pub CCline: DWORD,
    pub DataFormat: DWORD,
    pub Transmit: DWORD,
}

// ============================================================================
// Constants
// ============================================================================

/// Let the SDK scan every interface when opening a camera.
pub const PCO_INTERFACE_ANY: WORD = 0xFFFF;

pub const PCO_NOERROR: DWORD = 0;

/// Camera Link data format field mask and values (`SC2_CamLink` headers).
pub const PCO_CL_DATAFORMAT_MASK: DWORD = 0x0F;
pub const PCO_CL_DATAFORMAT_1x16: DWORD = 0x01;
pub const PCO_CL_DATAFORMAT_2x12: DWORD = 0x02;
pub const PCO_CL_DATAFORMAT_3x8: DWORD = 0x03;
pub const PCO_CL_DATAFORMAT_4x16: DWORD = 0x04;
pub const PCO_CL_DATAFORMAT_5x16: DWORD = 0x05;
pub const PCO_CL_DATAFORMAT_5x12: DWORD = 0x07;
pub const PCO_CL_DATAFORMAT_10x8: DWORD = 0x08;
pub const PCO_CL_DATAFORMAT_5x12R: DWORD = 0x09;
pub const PCO_CL_DATAFORMAT_5x12L: DWORD = 0x0A;

/// `dwGeneralCapsDESC1`: ROI must be symmetric about the vertical center line.
pub const GENERALCAPS1_ROI_VERT_SYMM_TO_HORZ_AXIS: DWORD = 0x0080_0000;
/// `dwGeneralCapsDESC1`: ROI must be symmetric about the horizontal center line.
pub const GENERALCAPS1_ROI_HORZ_SYMM_TO_VERT_AXIS: DWORD = 0x0100_0000;

/// `SetROI` rejected the coordinates as out of range.
pub const PCO_ERROR_ROI_OUT_OF_RANGE: DWORD = 0xA00A_3001;

/// `AllocateBuffer` with this number asks the SDK to choose a free slot.
pub const PCO_NEW_BUFFER: SHORT = -1;

// WaitForSingleObject results (winbase.h)
pub const WAIT_OBJECT_0: DWORD = 0x0000_0000;
pub const WAIT_ABANDONED: DWORD = 0x0000_0080;
pub const WAIT_TIMEOUT: DWORD = 0x0000_0102;
pub const WAIT_FAILED: DWORD = 0xFFFF_FFFF;

// ============================================================================
// SC2_Cam entry points (SC2_CamExport.h)
// ============================================================================

#[cfg(feature = "pco-sdk")]
#[link(name = "SC2_Cam")]
extern "system" {
    pub fn PCO_OpenCameraEx(ph: *mut HANDLE, strOpenStruct: *mut PCO_OpenStruct) -> c_int;
    pub fn PCO_CloseCamera(ph: HANDLE) -> c_int;
    pub fn PCO_GetCameraDescription(ph: HANDLE, strDescription: *mut PCO_Description) -> c_int;

    pub fn PCO_GetSizes(
        ph: HANDLE,
        wXResAct: *mut WORD,
        wYResAct: *mut WORD,
        wXResMax: *mut WORD,
        wYResMax: *mut WORD,
    ) -> c_int;
    pub fn PCO_SetROI(ph: HANDLE, wRoiX0: WORD, wRoiY0: WORD, wRoiX1: WORD, wRoiY1: WORD)
        -> c_int;
    pub fn PCO_GetROI(
        ph: HANDLE,
        wRoiX0: *mut WORD,
        wRoiY0: *mut WORD,
        wRoiX1: *mut WORD,
        wRoiY1: *mut WORD,
    ) -> c_int;
    pub fn PCO_SetBinning(ph: HANDLE, wBinHorz: WORD, wBinVert: WORD) -> c_int;
    pub fn PCO_GetBinning(ph: HANDLE, wBinHorz: *mut WORD, wBinVert: *mut WORD) -> c_int;

    pub fn PCO_SetDelayExposureTime(
        ph: HANDLE,
        dwDelay: DWORD,
        dwExposure: DWORD,
        wTimeBaseDelay: WORD,
        wTimeBaseExposure: WORD,
    ) -> c_int;
    pub fn PCO_GetDelayExposureTime(
        ph: HANDLE,
        dwDelay: *mut DWORD,
        dwExposure: *mut DWORD,
        wTimeBaseDelay: *mut WORD,
        wTimeBaseExposure: *mut WORD,
    ) -> c_int;
    pub fn PCO_SetFrameRate(
        ph: HANDLE,
        wFrameRateStatus: *mut WORD,
        wFramerateMode: WORD,
        dwFramerate: *mut DWORD,
        dwFramerateExposure: *mut DWORD,
    ) -> c_int;
    pub fn PCO_GetFrameRate(
        ph: HANDLE,
        wFrameRateStatus: *mut WORD,
        dwFramerate: *mut DWORD,
        dwFramerateExposure: *mut DWORD,
    ) -> c_int;

    pub fn PCO_ArmCamera(ph: HANDLE) -> c_int;
    pub fn PCO_GetRecordingState(ph: HANDLE, wRecState: *mut WORD) -> c_int;
    pub fn PCO_SetRecordingState(ph: HANDLE, wRecState: WORD) -> c_int;
    pub fn PCO_GetTriggerMode(ph: HANDLE, wTriggerMode: *mut WORD) -> c_int;
    pub fn PCO_SetTriggerMode(ph: HANDLE, wTriggerMode: WORD) -> c_int;
    pub fn PCO_ForceTrigger(ph: HANDLE, wTriggered: *mut WORD) -> c_int;
    pub fn PCO_GetPixelRate(ph: HANDLE, dwPixelRate: *mut DWORD) -> c_int;

    pub fn PCO_GetTransferParameter(ph: HANDLE, buffer: *mut c_void, ilen: c_int) -> c_int;
    pub fn PCO_SetTransferParametersAuto(ph: HANDLE, buffer: *mut c_void, ilen: c_int) -> c_int;
    pub fn PCO_CamLinkSetImageParameters(ph: HANDLE, wxres: WORD, wyres: WORD) -> c_int;

    pub fn PCO_AllocateBuffer(
        ph: HANDLE,
        sBufNr: *mut SHORT,
        dwSize: DWORD,
        wBuf: *mut *mut WORD,
        hEvent: *mut HANDLE,
    ) -> c_int;
    pub fn PCO_FreeBuffer(ph: HANDLE, sBufNr: SHORT) -> c_int;
    pub fn PCO_AddBufferEx(
        ph: HANDLE,
        dw1stImage: DWORD,
        dwLastImage: DWORD,
        sBufNr: SHORT,
        wXRes: WORD,
        wYRes: WORD,
        wBitPerPixel: WORD,
    ) -> c_int;
    pub fn PCO_CancelImages(ph: HANDLE) -> c_int;
    pub fn PCO_GetBufferStatus(
        ph: HANDLE,
        sBufNr: SHORT,
        dwStatusDll: *mut DWORD,
        dwStatusDrv: *mut DWORD,
    ) -> c_int;

    pub fn PCO_GetErrorTextSDK(dwError: DWORD, pszErrorString: *mut c_char, dwErrorStringLength: DWORD);
}

// ============================================================================
// Win32 event primitives (kernel32)
// ============================================================================

#[cfg(all(feature = "pco-sdk", windows))]
#[link(name = "kernel32")]
extern "system" {
    pub fn WaitForSingleObject(hHandle: HANDLE, dwMilliseconds: DWORD) -> DWORD;
    pub fn ResetEvent(hEvent: HANDLE) -> BOOL;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_size_fields_prefilled() {
        let open = PCO_OpenStruct::default();
        assert_eq!(open.wSize as usize, std::mem::size_of::<PCO_OpenStruct>());
        assert_eq!(open.wInterfaceType, PCO_INTERFACE_ANY);

        let desc = PCO_Description::default();
        assert_eq!(desc.wSize as usize, std::mem::size_of::<PCO_Description>());
        assert_eq!(desc.wRoiHorStepsDESC, 0);
    }

    #[test]
    fn test_transfer_param_layout() {
        assert_eq!(std::mem::size_of::<PCO_SC2_CL_TRANSFER_PARAM>(), 20);
    }

    #[test]
    fn test_dataformat_values_fit_mask() {
        for format in [
            PCO_CL_DATAFORMAT_5x16,
            PCO_CL_DATAFORMAT_5x12,
            PCO_CL_DATAFORMAT_10x8,
            PCO_CL_DATAFORMAT_5x12R,
            PCO_CL_DATAFORMAT_5x12L,
        ] {
            assert_eq!(format & PCO_CL_DATAFORMAT_MASK, format);
        }
    }
}
