use anyhow::bail;
use bulwark::{check, check_not, check_str_eq, check_str_ne, fail, pass, Registry};
use std::time::Duration;

const SUITE_ENV: &str = "BULWARK_DEMO_SUITE";

#[derive(Debug, Clone, Copy)]
enum Suite {
    Passing,
    Mixed,
    Duplicates,
    Showcase,
}

fn selected_suite() -> anyhow::Result<Suite> {
    let name = std::env::var(SUITE_ENV).unwrap_or_else(|_| "showcase".to_string());
    Ok(match name.as_str() {
        "passing" => Suite::Passing,
        "mixed" => Suite::Mixed,
        "duplicates" => Suite::Duplicates,
        "showcase" => Suite::Showcase,
        other => bail!(
            "unknown demo suite '{}' (expected passing, mixed, duplicates or showcase)",
            other
        ),
    })
}

fn main() -> anyhow::Result<()> {
    let suite = selected_suite()?;

    let code = bulwark::run(std::env::args_os(), |registry| match suite {
        Suite::Passing => define_arithmetic(registry),
        Suite::Mixed => define_mixed(registry),
        Suite::Duplicates => define_duplicates(registry),
        Suite::Showcase => define_showcase(registry),
    });

    std::process::exit(code);
}

fn define_arithmetic(registry: &mut Registry) {
    registry
        .register("arithmetic_addition_basic", |t| {
            check!(t, 1 + 2 == 3);
            check!(t, 4 + 2 == 6);
            check!(t, 8 + 8 == 16);
        })
        .register("arithmetic_addition_big", |t| {
            check!(t, 1000 + 2000 == 3000);
            check!(t, 4000 + 2000 == 6000);
            check!(t, 8000 + 8000 == 16000);
        })
        .register("arithmetic_multiplication", |t| {
            check!(t, 2 * 3 == 6);
            check!(t, 4 * 3 == 12);
            check!(t, 3 * 3 == 9);
        });
}

fn define_mixed(registry: &mut Registry) {
    registry
        .register("passes", |t| {
            check!(t, 2 + 2 == 4);
        })
        .register("strings_invalid", |t| {
            check_str_eq!(t, "Evil", "Good");
        })
        .register("invalid_read", |_| invalid_read());
}

fn define_duplicates(registry: &mut Registry) {
    registry
        .register("same", |t| {
            check!(t, 1 + 1 == 2);
        })
        .register("same", |t| {
            check!(t, 2 + 2 == 4);
        });
}

fn define_showcase(registry: &mut Registry) {
    define_arithmetic(registry);

    registry
        .register("strings_basic", |t| {
            check_not!(t, "abba".len() != 4);
            check!(t, "abba" != "Abba");
            check_str_eq!(t, "abba", "abba");
            check_str_ne!(t, "Alfa", "adolf");
        })
        .register("strings_invalid", |t| {
            check_str_eq!(t, "Evil", "Good");
        })
        .register("strings_more", |t| {
            for s in ["aaa", "bbb", "ccc", "ddd", "eee"] {
                check_str_eq!(t, s, s.to_string());
            }
        })
        .register("vector_growth", |t| {
            let mut values = Vec::new();
            for i in 0..100_000u64 {
                values.push(i * 14);
                check!(t, values[0] == 0);
            }
            check!(t, values.len() == 100_000);
            check!(t, values[99_999] == 99_999 * 14);
        })
        .register("fail_fast", |t| {
            println!("before the failing check");
            check!(t, 1 < 2);
            check!(t, 2 > 3);
            println!("never printed");
        })
        .register("forced_pass", |t| {
            let config = Some(Duration::from_secs(1));
            if config.is_some() {
                pass!(t);
            }
            check!(t, false);
        })
        .register("forced_fail", |t| {
            let reachable = std::env::var("PATH").is_ok() || cfg!(unix);
            if reachable {
                fail!(t);
            }
        })
        .register("invalid_read", |_| invalid_read())
        .register("abort", |_| std::process::abort())
        .register("arithmetic_trap", |_| raise(libc::SIGFPE))
        .register("illegal_instruction", |_| raise(libc::SIGILL))
        .register("panics", |_| {
            let empty: Vec<u8> = Vec::new();
            std::hint::black_box(empty[1]);
        })
        .register("hangs", |_| loop {
            std::thread::sleep(Duration::from_millis(100));
        })
        .register("runs_after_hang", |t| {
            check!(t, true);
        });
}

/// Reads from an unmapped address.
fn invalid_read() {
    let address = 0x10 as *const u32;
    let value = unsafe { std::ptr::read_volatile(address) };
    std::hint::black_box(value);
}

fn raise(signal: libc::c_int) {
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}
