// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    expose_m_profile();
    generate_statics()?;
    Ok(())
}

/// Exposes the CPU's M-profile architecture version as `armv6m`, `armv7m` or
/// `armv8m`. Host builds get none of these.
fn expose_m_profile() {
    println!("cargo::rustc-check-cfg=cfg(armv6m, armv7m, armv8m)");

    let target = env::var("TARGET").unwrap_or_default();
    if target.starts_with("thumbv6m") {
        println!("cargo:rustc-cfg=armv6m");
    } else if target.starts_with("thumbv7m") || target.starts_with("thumbv7em")
    {
        println!("cargo:rustc-cfg=armv7m");
    } else if target.starts_with("thumbv8m") {
        println!("cargo:rustc-cfg=armv8m");
    }
}

fn generate_statics() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed=HWI_KCONFIG");
    let kconfig: KernelConfig = match env::var("HWI_KCONFIG") {
        Ok(text) => ron::de::from_str(&text)?,
        Err(_) => KernelConfig::default(),
    };
    kconfig.validate()?;

    let out = &PathBuf::from(env::var_os("OUT_DIR").ok_or("no OUT_DIR")?);
    let mut file = File::create(out.join("kconfig.rs"))?;

    writeln!(file, "// See build.rs for details")?;
    writeln!(
        file,
        "pub const NUM_INTERRUPTS: usize = {};",
        kconfig.num_interrupts
    )?;
    writeln!(
        file,
        "pub const NUM_SPARSE_INTERRUPTS: usize = {};",
        kconfig.sparse_interrupts
    )?;
    writeln!(file, "pub const MAX_HWI: usize = {};", kconfig.max_objects)?;

    writeln!(file, "pub const KCONFIG: HwiConfig = HwiConfig {{")?;
    writeln!(
        file,
        "    disable_priority: abi::Priority({}),",
        kconfig.disable_priority
    )?;
    writeln!(file, "    pri_group: {},", kconfig.pri_group)?;
    writeln!(
        file,
        "    ccr: abi::CcrFlags::from_bits_truncate({:#x}),",
        kconfig.ccr.flags().bits()
    )?;
    writeln!(file, "    auto_nesting: {},", kconfig.auto_nesting)?;
    writeln!(file, "    task_support: {},", kconfig.task_support)?;
    writeln!(file, "    swi_support: {},", kconfig.swi_support)?;
    writeln!(
        file,
        "    exc_policy: abi::ExceptionPolicy::{:?},",
        kconfig.exception_policy
    )?;
    writeln!(file, "    num_cores: {},", kconfig.num_cores)?;
    writeln!(file, "    affinity: &[")?;
    for a in &kconfig.affinity {
        writeln!(
            file,
            "        abi::IrqAffinity {{ irq: {}, core: abi::CoreId({}) }},",
            a.irq, a.core.0
        )?;
    }
    writeln!(file, "    ],")?;
    writeln!(file, "}};")?;

    Ok(())
}

#[derive(Deserialize)]
#[serde(default)]
struct KernelConfig {
    /// Vector table length, including the 16 system exception slots.
    num_interrupts: usize,
    /// Size of the sparse dispatch table. Zero selects the dense table.
    sparse_interrupts: usize,
    /// Number of interrupt objects that may exist at once.
    max_objects: usize,
    disable_priority: u8,
    pri_group: u8,
    ccr: abi::CcrDesc,
    auto_nesting: bool,
    task_support: bool,
    swi_support: bool,
    exception_policy: abi::ExceptionPolicy,
    num_cores: usize,
    affinity: Vec<abi::IrqAffinity>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            num_interrupts: 80,
            sparse_interrupts: 0,
            max_objects: 32,
            disable_priority: 32,
            pri_group: 0,
            ccr: abi::CcrDesc::default(),
            auto_nesting: true,
            task_support: true,
            swi_support: true,
            exception_policy: abi::ExceptionPolicy::Max,
            num_cores: 1,
            affinity: vec![],
        }
    }
}

impl KernelConfig {
    fn validate(&self) -> Result<(), String> {
        let n = self.num_interrupts;
        if !(usize::from(abi::NUM_SYSTEM_VECTORS) + 1..=256).contains(&n) {
            return Err(format!("num_interrupts {n} out of range 17..=256"));
        }
        if self.max_objects == 0 || self.max_objects > usize::from(u16::MAX) {
            return Err(format!("max_objects {} invalid", self.max_objects));
        }
        if self.pri_group > 7 {
            return Err(format!("pri_group {} exceeds 7", self.pri_group));
        }
        if self.num_cores == 0 || self.num_cores > abi::MAX_CORES {
            return Err(format!(
                "num_cores {} must be in 1..={}",
                self.num_cores,
                abi::MAX_CORES
            ));
        }
        for a in &self.affinity {
            if usize::from(a.irq) >= n || a.irq < abi::NUM_SYSTEM_VECTORS {
                return Err(format!("affinity names bad interrupt {}", a.irq));
            }
        }
        Ok(())
    }
}
