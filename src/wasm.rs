//! WASM bindings for Tubefit Core.
//!
//! Exposes a fitted device to JavaScript for interactive curve plotting and
//! stage design in the browser.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmDevice } from 'tubefit_core';
//!
//! await init();
//!
//! const device = new WasmDevice(await (await fetch('el84.json')).text());
//! const ia = device.anode_current(250, -7.3, 250);
//!
//! // [vk, ik, rk, pout, phead, hd2, hd3, hd4, hd5, thd]
//! const stage = device.single_ended(250, 250, 48, 5200, 0);
//! ```

use wasm_bindgen::prelude::*;

use crate::circuit::{Circuit, SingleEndedOutput};
use crate::device::Device;
use crate::error::TubeError;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn to_js(err: TubeError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// A fitted device loaded from its JSON document.
#[wasm_bindgen]
pub struct WasmDevice {
    device: Device,
}

#[wasm_bindgen]
impl WasmDevice {
    /// Parse a device document.
    ///
    /// # Example
    /// ```javascript
    /// const device = new WasmDevice(deviceJson);
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(device_json: &str) -> Result<WasmDevice, JsValue> {
        let device = Device::from_json_str(device_json).map_err(to_js)?;
        Ok(WasmDevice { device })
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.device.name.clone()
    }

    /// Anode current in mA.
    #[wasm_bindgen]
    pub fn anode_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        self.device.anode_current(va, vg1, vg2)
    }

    /// Screen current in mA; zero for triodes.
    #[wasm_bindgen]
    pub fn screen_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        self.device.screen_current(va, vg1, vg2)
    }

    /// Solve a single-ended output stage.
    ///
    /// # Returns
    /// `[vk, ik, rk, pout, phead, hd2, hd3, hd4, hd5, thd]`, all zero when the
    /// stage cannot be biased.
    #[wasm_bindgen]
    pub fn single_ended(&self, vb: f64, vs: f64, ia: f64, ra: f64, headroom: f64) -> Vec<f64> {
        let mut stage = SingleEndedOutput::new();
        stage.vb = vb;
        stage.vs = vs;
        stage.ia = ia;
        stage.ra = ra;
        stage.headroom = headroom;
        stage.update(Some(&self.device));

        let r = stage.result();
        let h = &r.harmonics;
        vec![
            r.vk, r.ik, r.rk, r.pout, r.phead, h.hd2, h.hd3, h.hd4, h.hd5, h.thd,
        ]
    }

    /// Device document with the current model coefficients.
    #[wasm_bindgen]
    pub fn to_json(&self) -> Result<String, JsValue> {
        let value = self.device.to_json().map_err(to_js)?;
        serde_json::to_string(&value).map_err(|e| {
            to_js(TubeError::WasmError {
                message: e.to_string(),
            })
        })
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
