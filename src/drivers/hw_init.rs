//! One-shot hardware peripheral initialization.
//!
//! Configures the PSU ADC channel, the fan tach input with its ISR, and the
//! LEDC fan PWM through raw ESP-IDF sys calls, each checked with `esp!`.
//! Called once from `main()` before the cooperative loop starts.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicPtr, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    LedcInitFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed(rc) => write!(f, "LEDC timer/channel config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

impl From<HwInitError> for crate::error::Error {
    fn from(_: HwInitError) -> Self {
        Self::Init("peripheral init")
    }
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    init_adc()?;
    init_tach_input()?;
    init_ledc()?;
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

/// ADC1 channel wired to the PSU divider.
pub const ADC1_CH_PSU: u32 = 6;

/// Oneshot unit handle, written once by `init_adc()` before the loop and
/// only read afterwards from the main task.
#[cfg(target_os = "espidf")]
static ADC1_HANDLE: AtomicPtr<adc_oneshot_unit_ctx_t> = AtomicPtr::new(core::ptr::null_mut());

#[cfg(target_os = "espidf")]
fn init_adc() -> Result<(), HwInitError> {
    let fail = |e: EspError| HwInitError::AdcInitFailed(e.code());
    let unit_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
    // SAFETY: both pointers are valid for the duration of the call.
    esp!(unsafe { adc_oneshot_new_unit(&unit_cfg, &mut handle) }).map_err(fail)?;

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    // SAFETY: `handle` was just created by adc_oneshot_new_unit.
    esp!(unsafe { adc_oneshot_config_channel(handle, ADC1_CH_PSU, &chan_cfg) }).map_err(fail)?;
    ADC1_HANDLE.store(handle, Ordering::Release);

    info!("hw_init: ADC1 CH{} on GPIO{} (PSU divider)", ADC1_CH_PSU, pins::PSU_ADC_GPIO);
    Ok(())
}

/// One raw sample, `None` before init or when the driver reports an error.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Option<u16> {
    let handle = ADC1_HANDLE.load(Ordering::Acquire);
    if handle.is_null() {
        return None;
    }
    let mut raw: i32 = 0;
    // SAFETY: non-null handle from init_adc(); only the main task reads.
    esp!(unsafe { adc_oneshot_read(handle, channel, &mut raw) }).ok()?;
    Some(raw.clamp(0, i32::from(u16::MAX)) as u16)
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> Option<u16> {
    Some(0)
}

// ── Fan tach input ────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn init_tach_input() -> Result<(), HwInitError> {
    // GPIO35 has no internal pull-up; the fan board provides one.
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FAN_TACH_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: `cfg` outlives the call.
    esp!(unsafe { gpio_config(&cfg) }).map_err(|e| HwInitError::GpioConfigFailed(e.code()))?;
    info!("hw_init: fan tach on GPIO{}", pins::FAN_TACH_GPIO);
    Ok(())
}

// ── LEDC PWM ─────────────────────────────────────────────────

pub const LEDC_CH_FAN: u32 = 0;

#[cfg(target_os = "espidf")]
fn init_ledc() -> Result<(), HwInitError> {
    let fail = |e: EspError| HwInitError::LedcInitFailed(e.code());
    let timer = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::FAN_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    let channel = ledc_channel_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        channel: LEDC_CH_FAN,
        timer_sel: ledc_timer_t_LEDC_TIMER_0,
        gpio_num: pins::FAN_PWM_GPIO,
        duty: 0,
        hpoint: 0,
        ..Default::default()
    };
    // SAFETY: both configs outlive their calls.
    esp!(unsafe { ledc_timer_config(&timer) }).map_err(fail)?;
    esp!(unsafe { ledc_channel_config(&channel) }).map_err(fail)?;

    info!("hw_init: fan PWM CH{} @ {} Hz on GPIO{}", LEDC_CH_FAN, pins::FAN_PWM_FREQ_HZ, pins::FAN_PWM_GPIO);
    Ok(())
}

/// Write an 8-bit duty to `channel`. Errors only mean the channel was
/// never configured, which `init_peripherals` already reported.
#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: plain register writes on a channel set up by init_ledc().
    let _ = esp!(unsafe { ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty)) })
        .and_then(|()| esp!(unsafe { ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel) }));
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tach_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::drivers::fan::FAN_TACH_PULSES.record_pulse();
}

/// Install the GPIO ISR service and register the fan tach handler.
/// Call after init_peripherals() and before the loop.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    let fail = |e: EspError| HwInitError::IsrInstallFailed(e.code());
    // SAFETY: ESP_ERR_INVALID_STATE means another driver already installed
    // the service, which is fine.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_ERR_INVALID_STATE {
        esp!(ret).map_err(fail)?;
    }
    // SAFETY: the handler only bumps an atomic counter and takes no argument.
    esp!(unsafe { gpio_isr_handler_add(pins::FAN_TACH_GPIO, Some(tach_gpio_isr), core::ptr::null_mut()) })
        .map_err(fail)?;
    esp!(unsafe { gpio_intr_enable(pins::FAN_TACH_GPIO) }).map_err(fail)?;
    info!("hw_init: ISR service installed (fan tach)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
