// build.rs

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

const FALLBACK_LOCALE: &str = "locales/en.toml";

fn main() {
    // A `lang_*` cargo feature wins over the DEVOPTS_LANG variable.
    let mut requested: Vec<String> = env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_LANG_")
                .map(str::to_lowercase)
        })
        .collect();
    requested.sort();

    let lang = match requested.first() {
        Some(first) => {
            if requested.len() > 1 {
                println!(
                    "cargo:warning=Several language features enabled ({:?}), using '{}'.",
                    requested, first
                );
            }
            first.clone()
        }
        None => env::var("DEVOPTS_LANG").unwrap_or_else(|_| "en".to_string()),
    };

    println!("cargo:rustc-env=DEVOPTS_LANG_EFFECTIVE={}", lang);
    println!("cargo:rerun-if-env-changed=DEVOPTS_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    let fallback = fs::read_to_string(FALLBACK_LOCALE)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", FALLBACK_LOCALE, e));
    let mut messages: BTreeMap<String, String> = toml::from_str(&fallback)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", FALLBACK_LOCALE, e));

    if lang != "en" {
        let localized_path = format!("locales/{}.toml", lang);
        match fs::read_to_string(&localized_path) {
            Ok(content) => {
                let localized: BTreeMap<String, String> = toml::from_str(&content)
                    .unwrap_or_else(|e| panic!("Failed to parse {}: {}", localized_path, e));
                messages.extend(localized);
            }
            Err(_) => println!(
                "cargo:warning=Locale '{}' not found, messages stay in English.",
                localized_path
            ),
        }
    }

    // One macro arm per message key; unknown keys fail at compile time.
    let mut source = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, message) in &messages {
        let escaped = message.replace('\\', "\\\\").replace('"', "\\\"");
        source.push_str(&format!("    (\"{}\") => {{ \"{}\" }};\n", key, escaped));
    }
    source.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing message key: \", $key)) }};\n",
    );
    source.push('}');

    let out_dir = env::var("OUT_DIR").unwrap_or_else(|e| panic!("OUT_DIR not set: {}", e));
    let destination = Path::new(&out_dir).join("messages.rs");
    fs::write(&destination, source)
        .unwrap_or_else(|e| panic!("Failed to write {}: {}", destination.display(), e));
}
