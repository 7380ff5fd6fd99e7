//! Runtime CPU feature probes for kernel selection.
//!
//! Detection runs once per feature and is cached process-wide; after the
//! first call the probes are plain relaxed loads. Non-x86 targets report
//! no SIMD support and every primitive takes its scalar kernel.

use cfg_if::cfg_if;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cpu {
    pub sse2: bool,
    pub sse41: bool,
    pub avx2: bool,
}

cfg_if! {
    if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
        cpufeatures::new!(cpuid_sse2, "sse2");
        cpufeatures::new!(cpuid_sse41, "sse4.1");
        cpufeatures::new!(cpuid_avx2, "avx2");

        #[inline]
        pub(crate) fn features() -> Cpu {
            Cpu {
                sse2: cpuid_sse2::get(),
                sse41: cpuid_sse41::get(),
                avx2: cpuid_avx2::get(),
            }
        }
    } else {
        #[inline]
        pub(crate) fn features() -> Cpu {
            Cpu {
                sse2: false,
                sse41: false,
                avx2: false,
            }
        }
    }
}
