//! mDNS adapter: hostname registration and service lookup.
//!
//! Registers `<hostname>.local` and implements [`ServiceBrowser`] with a
//! PTR query, used to find the controller on the LAN. Uses the ESP-IDF
//! mDNS component on device; on simulation targets queries answer from a
//! list the test installs.
//!
//! Lifecycle is tied to WiFi: start on connect, stop on disconnect.

use log::info;

use crate::app::ports::{ServiceBrowser, ServiceRecord};

/// Upper bound on answers collected per query.
#[cfg(target_os = "espidf")]
const MAX_RESULTS: usize = 8;

pub struct MdnsBrowser {
    hostname: heapless::String<32>,
    active: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_records: Vec<ServiceRecord>,
}

impl MdnsBrowser {
    pub fn new(hostname: heapless::String<32>) -> Self {
        Self {
            hostname,
            active: false,
            #[cfg(not(target_os = "espidf"))]
            sim_records: Vec::new(),
        }
    }

    /// Whether the responder is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start the responder and register the hostname.
    /// Call after WiFi is connected and has an IP.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = self.platform_start();
        if self.active {
            info!("mDNS: registered {}.local", self.hostname);
        }
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.platform_stop();
        self.active = false;
        info!("mDNS: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) -> bool {
        use esp_idf_svc::sys::*;
        // SAFETY: single-task use; the hostname buffer is NUL-terminated
        // and copied by mdns_hostname_set.
        unsafe {
            let ret = mdns_init();
            if ret != ESP_OK as i32 {
                log::error!("mDNS: mdns_init failed ({})", ret);
                return false;
            }
            let mut hostname_buf = [0u8; 33];
            let hb = self.hostname.as_bytes();
            let hl = hb.len().min(32);
            hostname_buf[..hl].copy_from_slice(&hb[..hl]);
            mdns_hostname_set(hostname_buf.as_ptr() as *const _);
            mdns_instance_name_set(b"FluidDash\0".as_ptr() as *const _);
        }
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) -> bool {
        info!("mDNS(sim): responder up for {}.local", self.hostname);
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        // SAFETY: only called after a successful mdns_init.
        unsafe {
            esp_idf_svc::sys::mdns_free();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("mDNS(sim): responder down");
    }

    #[cfg(target_os = "espidf")]
    fn platform_browse(&self, service: &str, proto: &str, timeout_ms: u32) -> Vec<ServiceRecord> {
        use core::ffi::CStr;
        use esp_idf_svc::sys::*;

        let mut svc_buf = [0u8; 24];
        let sl = service.len().min(23);
        svc_buf[..sl].copy_from_slice(&service.as_bytes()[..sl]);
        let mut proto_buf = [0u8; 8];
        let pl = proto.len().min(7);
        proto_buf[..pl].copy_from_slice(&proto.as_bytes()[..pl]);

        let mut results: *mut mdns_result_t = core::ptr::null_mut();
        // SAFETY: the result list is owned by us until mdns_query_results_free;
        // every pointer is checked for null before it is dereferenced.
        unsafe {
            let ret = mdns_query_ptr(
                svc_buf.as_ptr() as *const _,
                proto_buf.as_ptr() as *const _,
                timeout_ms,
                MAX_RESULTS as i32,
                &mut results,
            );
            if ret != ESP_OK as i32 {
                log::warn!("mDNS: query {}.{} failed ({})", service, proto, ret);
                return Vec::new();
            }

            let mut out = Vec::new();
            let mut cur = results;
            while !cur.is_null() {
                let r = &*cur;
                let hostname = if r.hostname.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr(r.hostname).to_string_lossy().into_owned()
                };
                if !r.addr.is_null() {
                    let ip = (*r.addr).addr.u_addr.ip4.addr.to_le_bytes();
                    out.push(ServiceRecord {
                        hostname,
                        address: format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]),
                        port: r.port,
                    });
                }
                cur = r.next;
            }
            mdns_query_results_free(results);
            out
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_browse(&self, service: &str, proto: &str, _timeout_ms: u32) -> Vec<ServiceRecord> {
        info!(
            "mDNS(sim): query {}.{} -> {} answer(s)",
            service,
            proto,
            self.sim_records.len()
        );
        self.sim_records.clone()
    }
}

#[cfg(not(target_os = "espidf"))]
impl MdnsBrowser {
    /// Answers returned by subsequent simulated queries.
    pub fn sim_set_records(&mut self, records: Vec<ServiceRecord>) {
        self.sim_records = records;
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&mut self, service: &str, proto: &str, timeout_ms: u32) -> Vec<ServiceRecord> {
        if !self.active {
            self.start();
        }
        let records = self.platform_browse(service, proto, timeout_ms);
        for r in &records {
            info!("mDNS: {} -> {}:{}", r.hostname, r.address, r.port);
        }
        records
    }
}
