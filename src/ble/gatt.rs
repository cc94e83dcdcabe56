//! Bluedroid GATT server for the LED service (ESP-IDF only).
//!
//! Registers one primary service with the LED characteristic and its CCC
//! descriptor, advertises, and routes stack callbacks into [`LedService`].
//! Connection changes are posted to the LED node bus with zero timeout.
//!
//! Bluedroid callbacks are C function pointers that cannot capture Rust
//! closures; the service handle and bus are bridged through statics set
//! once in [`start`], attribute handles through atomics.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use core::time::Duration;
use std::sync::{Arc, OnceLock};

use esp_idf_svc::sys::*;
use log::{error, info, warn};

use crate::bus::{BusHandle, Event};
use crate::error::{Error, NotifyError};

use super::led_service::{CHAR_LED_UUID, GattNotifier, LedService, SERVICE_UUID};

const CCC_UUID16: u16 = 0x2902;
/// Service declaration, characteristic declaration + value, CCC.
const SERVICE_HANDLES: u16 = 4;

static SERVICE: OnceLock<Arc<LedService>> = OnceLock::new();
static NODE_BUS: OnceLock<BusHandle> = OnceLock::new();

static GATTS_IF: AtomicU32 = AtomicU32::new(0);
static CONN_ID: AtomicU32 = AtomicU32::new(0);
static CONNECTED: AtomicBool = AtomicBool::new(false);
static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
static LED_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
static LED_CCC_HANDLE: AtomicU32 = AtomicU32::new(0);

fn uuid128_to_esp(uuid: u128) -> esp_bt_uuid_t {
    // SAFETY: plain C struct, all-zero is a valid bit pattern.
    let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

fn uuid16_to_esp(uuid: u16) -> esp_bt_uuid_t {
    // SAFETY: plain C struct, all-zero is a valid bit pattern.
    let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

fn post_connection(connected: bool) {
    if let Some(bus) = NODE_BUS.get() {
        let _ = bus.post_event(Event::BleConnection { connected }, Duration::ZERO);
    }
}

unsafe fn start_advertising() {
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        // SAFETY: remaining fields are plain integers.
        ..unsafe { core::mem::zeroed() }
    };
    // SAFETY: params outlive the call; the stack copies them.
    unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
}

/// Reply to a read or write that asked for an application response.
unsafe fn respond(gatts_if: esp_gatt_if_t, conn_id: u16, trans_id: u32, handle: u16, status: u8, value: &[u8]) {
    // SAFETY: plain C struct, all-zero is a valid bit pattern.
    let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
    // SAFETY: `attr_value` is the active union member for value responses.
    unsafe {
        rsp.attr_value.handle = handle;
        rsp.attr_value.len = value.len() as u16;
        rsp.attr_value.value[..value.len()].copy_from_slice(value);
        esp_ble_gatts_send_response(gatts_if, conn_id, trans_id, status as esp_gatt_status_t, &mut rsp);
    }
}

unsafe extern "C" fn gap_event_handler(
    event: esp_gap_ble_cb_event_t,
    _param: *mut esp_ble_gap_cb_param_t,
) {
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

unsafe extern "C" fn gatts_event_handler(
    event: esp_gatts_cb_event_t,
    gatts_if: esp_gatt_if_t,
    param: *mut esp_ble_gatts_cb_param_t,
) {
    GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // SAFETY: svc_id is copied by the stack.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, SERVICE_HANDLES) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            // SAFETY: `create` is the active member for this event.
            let svc_handle = unsafe { (*param).create.service_handle };
            SVC_HANDLE.store(u32::from(svc_handle), Ordering::Relaxed);
            let mut char_uuid = uuid128_to_esp(CHAR_LED_UUID);
            // SAFETY: null value/control selects application responses.
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut char_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    (ESP_GATT_CHAR_PROP_BIT_READ
                        | ESP_GATT_CHAR_PROP_BIT_WRITE
                        | ESP_GATT_CHAR_PROP_BIT_NOTIFY) as esp_gatt_char_prop_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            // SAFETY: `add_char` is the active member for this event.
            let handle = unsafe { (*param).add_char.attr_handle };
            LED_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
            info!("BLE GATTS: LED char (handle={})", handle);
            let mut ccc_uuid = uuid16_to_esp(CCC_UUID16);
            // SAFETY: see ADD_CHAR above.
            unsafe {
                esp_ble_gatts_add_char_descr(
                    SVC_HANDLE.load(Ordering::Relaxed) as u16,
                    &mut ccc_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            // SAFETY: `add_char_descr` is the active member for this event.
            let handle = unsafe { (*param).add_char_descr.attr_handle };
            LED_CCC_HANDLE.store(u32::from(handle), Ordering::Relaxed);
            info!("BLE GATTS: LED CCC (handle={}), service ready", handle);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            // SAFETY: `connect` is the active member for this event.
            let conn_id = unsafe { (*param).connect.conn_id };
            CONN_ID.store(u32::from(conn_id), Ordering::Relaxed);
            CONNECTED.store(true, Ordering::Release);
            post_connection(true);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            CONNECTED.store(false, Ordering::Release);
            if let Some(svc) = SERVICE.get() {
                svc.on_ccc_changed(0);
            }
            post_connection(false);
            // SAFETY: no arguments borrowed past the call.
            unsafe { start_advertising() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
            // SAFETY: `read` is the active member for this event.
            let p = unsafe { &(*param).read };
            if !p.need_rsp {
                return;
            }
            let Some(svc) = SERVICE.get() else {
                return;
            };
            let handle = u32::from(p.handle);
            let (status, value): (u8, heapless::Vec<u8, 2>) =
                if handle == LED_CHAR_HANDLE.load(Ordering::Relaxed) {
                    (0, heapless::Vec::from_slice(&[svc.on_read()]).unwrap_or_default())
                } else if handle == LED_CCC_HANDLE.load(Ordering::Relaxed) {
                    let ccc = u16::from(svc.notify_enabled());
                    (0, heapless::Vec::from_slice(&ccc.to_le_bytes()).unwrap_or_default())
                } else {
                    (esp_gatt_status_t_ESP_GATT_READ_NOT_PERMIT as u8, heapless::Vec::new())
                };
            // SAFETY: value outlives the call.
            unsafe { respond(gatts_if, p.conn_id, p.trans_id, p.handle, status, &value) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            // SAFETY: `write` is the active member; `value` points at `len` bytes.
            let p = unsafe { &(*param).write };
            let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };
            let Some(svc) = SERVICE.get() else {
                return;
            };
            let handle = u32::from(p.handle);
            let status = if handle == LED_CHAR_HANDLE.load(Ordering::Relaxed) {
                match svc.on_write(data, p.offset) {
                    Ok(_) => 0,
                    Err(e) => {
                        warn!("BLE GATTS: LED write rejected: {}", e);
                        e.code()
                    }
                }
            } else if handle == LED_CCC_HANDLE.load(Ordering::Relaxed) && data.len() == 2 {
                svc.on_ccc_changed(u16::from_le_bytes([data[0], data[1]]));
                0
            } else {
                esp_gatt_status_t_ESP_GATT_WRITE_NOT_PERMIT as u8
            };
            if p.need_rsp {
                // SAFETY: no borrowed data in the response.
                unsafe { respond(gatts_if, p.conn_id, p.trans_id, p.handle, status, &[]) };
            }
        }
        _ => {}
    }
}

/// Sends notifications on the LED characteristic of the connected central.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluedroidNotifier;

impl GattNotifier for BluedroidNotifier {
    fn notify(&mut self, value: &[u8]) -> Result<(), NotifyError> {
        if !CONNECTED.load(Ordering::Acquire) {
            return Err(NotifyError::NotSubscribed);
        }
        let mut buf: heapless::Vec<u8, 8> =
            heapless::Vec::from_slice(value).map_err(|()| NotifyError::Stack(ESP_ERR_INVALID_SIZE as i32))?;
        // SAFETY: buf outlives the call; the stack copies the payload.
        let rc = unsafe {
            esp_ble_gatts_send_indicate(
                GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                CONN_ID.load(Ordering::Relaxed) as u16,
                LED_CHAR_HANDLE.load(Ordering::Relaxed) as u16,
                buf.len() as u16,
                buf.as_mut_ptr(),
                false,
            )
        };
        if rc == ESP_OK as i32 {
            Ok(())
        } else {
            Err(NotifyError::Stack(rc))
        }
    }
}

fn check(rc: esp_err_t, what: &'static str) -> Result<(), Error> {
    if rc == ESP_OK as i32 {
        Ok(())
    } else {
        error!("BLE: {} failed ({})", what, rc);
        Err(Error::Init(what))
    }
}

/// Bring up the controller and Bluedroid, register the LED service and
/// start advertising as `device_name`.
pub fn start(
    device_name: &'static core::ffi::CStr,
    service: Arc<LedService>,
    bus: BusHandle,
) -> Result<BluedroidNotifier, Error> {
    if SERVICE.set(service).is_err() || NODE_BUS.set(bus).is_err() {
        return Err(Error::Init("BLE already started"));
    }

    // SAFETY: one-time stack bring-up from the main thread; callbacks are
    // 'static functions and the name is a 'static C string.
    unsafe {
        // BLE-only: release classic BT memory.
        esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
        let mut bt_cfg = esp_bt_controller_config_t::default();
        check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
        check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE), "bt_controller_enable")?;
        check(esp_bluedroid_init(), "bluedroid_init")?;
        check(esp_bluedroid_enable(), "bluedroid_enable")?;

        check(esp_ble_gap_register_callback(Some(gap_event_handler)), "gap_register")?;
        check(esp_ble_gatts_register_callback(Some(gatts_event_handler)), "gatts_register")?;
        check(esp_ble_gatts_app_register(0), "gatts_app_register")?;

        check(esp_ble_gap_set_device_name(device_name.as_ptr()), "set_device_name")?;
        start_advertising();
    }

    info!("BLE: Bluedroid up, advertising as {:?}", device_name);
    Ok(BluedroidNotifier)
}
