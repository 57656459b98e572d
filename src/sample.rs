//! Random, realistic catalog entries for demos and tests.

use std::time::SystemTime;

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::proto::device::Weight;
use crate::proto::keyboard::Layout;
use crate::proto::memory::Unit;
use crate::proto::screen::{Panel, Resolution};
use crate::proto::storage::Driver;
use crate::proto::{Device, Gpu, Keyboard, Memory, Processor, Screen, Storage};

/// A laptop with random hardware, a fresh UUID and `updated_at` set to now.
pub fn new_device() -> Device {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Apple", "Dell", "Lenovo"]);
    let name = match brand {
        "Apple" => pick(&["Macbook Air", "Macbook Pro"]),
        "Dell" => pick(&["Latitude", "Vostro", "XPS", "Alienware"]),
        _ => pick(&["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
    };

    Device {
        id: Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: name.to_string(),
        cpu: Some(new_processor()),
        ram: Some(new_ram()),
        gpus: vec![new_gpu(), new_gpu()],
        storages: vec![new_hdd(), new_ssd()],
        screen: Some(new_screen()),
        keyboard: Some(new_keyboard()),
        weight: Some(Weight::WeightKg(rng.gen_range(1.0..3.0))),
        price_usd: rng.gen_range(1500.0..3000.0),
        release_year: rng.gen_range(2015..=2020),
        updated_at: Some(prost_types::Timestamp::from(SystemTime::now())),
    }
}

/// A 2 to 8 core processor clocked between 2.0 and 5.0 GHz.
pub fn new_processor() -> Processor {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Intel", "AMD"]);
    let name = if brand == "Intel" {
        pick(&["Xeon E-2286M", "Core i9-9980HK", "Core i7-9750H", "Core i5-9400F"])
    } else {
        pick(&["Ryzen 7 PRO 2700U", "Ryzen 5 PRO 3500U", "Ryzen 3 PRO 3200GE"])
    };

    let number_cores = rng.gen_range(2..=8);
    let min_ghz = rng.gen_range(2.0..3.5);

    Processor {
        brand: brand.to_string(),
        name: name.to_string(),
        number_cores,
        number_threads: rng.gen_range(number_cores..=12),
        min_ghz,
        max_ghz: rng.gen_range(min_ghz..5.0),
    }
}

/// A discrete GPU with 2 to 6 GB of memory.
pub fn new_gpu() -> Gpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Nvidia", "AMD"]);
    let name = if brand == "Nvidia" {
        pick(&["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"])
    } else {
        pick(&["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"])
    };

    let min_ghz = rng.gen_range(1.0..1.5);

    Gpu {
        brand: brand.to_string(),
        name: name.to_string(),
        min_ghz,
        max_ghz: rng.gen_range(min_ghz..2.0),
        memory: Some(memory(rng.gen_range(2..=6), Unit::Gigabyte)),
    }
}

/// 4 to 64 GB of RAM.
pub fn new_ram() -> Memory {
    memory(rand::thread_rng().gen_range(4..=64), Unit::Gigabyte)
}

/// A 128 to 1024 GB SSD.
pub fn new_ssd() -> Storage {
    Storage {
        driver: Driver::Ssd as i32,
        memory: Some(memory(rand::thread_rng().gen_range(128..=1024), Unit::Gigabyte)),
    }
}

/// A 1 to 6 TB HDD.
pub fn new_hdd() -> Storage {
    Storage {
        driver: Driver::Hdd as i32,
        memory: Some(memory(rand::thread_rng().gen_range(1..=6), Unit::Terabyte)),
    }
}

/// A 13 to 17 inch 16:9 screen.
pub fn new_screen() -> Screen {
    let mut rng = rand::thread_rng();
    let height = rng.gen_range(1080..=4320);
    let panel = if rng.gen_bool(0.5) {
        Panel::Ips
    } else {
        Panel::Oled
    };

    Screen {
        size_inch: rng.gen_range(13.0..17.0),
        resolution: Some(Resolution {
            width: height * 16 / 9,
            height,
        }),
        panel: panel as i32,
        multitouch: rng.gen_bool(0.5),
    }
}

/// A keyboard with a random layout, backlit half the time.
pub fn new_keyboard() -> Keyboard {
    let mut rng = rand::thread_rng();
    let layout = [Layout::Qwerty, Layout::Qwertz, Layout::Azerty]
        .choose(&mut rng)
        .copied()
        .unwrap_or(Layout::Qwerty);

    Keyboard {
        layout: layout as i32,
        backlit: rng.gen_bool(0.5),
    }
}

/// A whole score between 1 and 10.
pub fn random_score() -> f64 {
    f64::from(rand::thread_rng().gen_range(1..=10u8))
}

fn memory(value: u64, unit: Unit) -> Memory {
    Memory {
        value,
        unit: unit as i32,
    }
}

fn pick(choices: &[&'static str]) -> &'static str {
    choices
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_is_complete_and_in_range() {
        let device = new_device();

        assert!(Uuid::parse_str(&device.id).is_ok());
        assert!((1500.0..3000.0).contains(&device.price_usd));
        assert!((2015..=2020).contains(&device.release_year));
        assert_eq!(device.gpus.len(), 2);
        assert_eq!(device.storages.len(), 2);
        assert!(device.updated_at.is_some());

        let cpu = device.cpu.unwrap();
        assert!((2..=8).contains(&cpu.number_cores));
        assert!(cpu.number_threads >= cpu.number_cores);
        assert!(cpu.max_ghz >= cpu.min_ghz);
    }

    #[test]
    fn devices_get_distinct_ids() {
        assert_ne!(new_device().id, new_device().id);
    }

    #[test]
    fn keyboard_has_a_known_layout() {
        for _ in 0..20 {
            assert_ne!(new_keyboard().layout(), Layout::Unknown);
        }
    }

    #[test]
    fn score_is_whole_and_bounded() {
        for _ in 0..100 {
            let score = random_score();
            assert!((1.0..=10.0).contains(&score));
            assert_eq!(score.fract(), 0.0);
        }
    }
}
