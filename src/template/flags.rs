// src/template/flags.rs

//! `use` flag translation
//!
//! Each build system gets its own spelling for an enabled feature. A few
//! common feature names have a well-known idiomatic flag per tool; anything
//! else falls back to the tool's generic form:
//!
//! | Template | Generic form |
//! |----------|--------------|
//! | meson | `-D<opt>=true` |
//! | cmake | `-D<OPT>=ON` |
//! | autotools | `--enable-<opt>` |
//! | cargo | `--features <opt>,<opt>` |
//! | python-pep517 | `--config-setting=<opt>=true` |
//! | gradle | `-P<opt>=true` |
//! | custom | none |

use crate::recipe::TemplateKind;

fn cmake_alias(flag: &str) -> Option<&'static [&'static str]> {
    Some(match flag {
        "nls" => &["-DENABLE_NLS=ON"],
        "shared" => &["-DBUILD_SHARED_LIBS=ON"],
        "lto" | "optimizations" => &["-DCMAKE_INTERPROCEDURAL_OPTIMIZATION=ON"],
        "debug" => &["-DCMAKE_BUILD_TYPE=Debug"],
        "release" => &["-DCMAKE_BUILD_TYPE=Release"],
        _ => return None,
    })
}

fn autotools_alias(flag: &str) -> Option<&'static [&'static str]> {
    Some(match flag {
        "shared" => &["--enable-shared", "--disable-static"],
        "release" => &["--disable-debug"],
        "optimizations" => &["--enable-lto", "--enable-optimizations"],
        _ => return None,
    })
}

fn cargo_alias(flag: &str) -> Option<&'static [&'static str]> {
    Some(match flag {
        "lto" | "optimizations" => &["--config=profile.release.lto=true"],
        "debug" => &["--config=profile.release.debug=true"],
        // cargo builds in release mode already
        "release" => &[],
        _ => return None,
    })
}

/// Translate enabled `use` flags into arguments for `template`
///
/// An empty list yields no arguments.
pub fn translate(template: TemplateKind, use_flags: &[String]) -> Vec<String> {
    match template {
        TemplateKind::Meson => use_flags.iter().map(|f| format!("-D{}=true", f)).collect(),
        TemplateKind::Cmake => use_flags
            .iter()
            .flat_map(|f| match cmake_alias(f) {
                Some(args) => args.iter().map(|a| a.to_string()).collect(),
                None => vec![format!("-D{}=ON", f.to_ascii_uppercase())],
            })
            .collect(),
        TemplateKind::Autotools => use_flags
            .iter()
            .flat_map(|f| match autotools_alias(f) {
                Some(args) => args.iter().map(|a| a.to_string()).collect(),
                None => vec![format!("--enable-{}", f)],
            })
            .collect(),
        TemplateKind::Cargo => {
            let mut args = Vec::new();
            let mut features = Vec::new();
            for flag in use_flags {
                match cargo_alias(flag) {
                    Some(extra) => args.extend(extra.iter().map(|a| a.to_string())),
                    None => features.push(flag.as_str()),
                }
            }
            if !features.is_empty() {
                args.push("--features".to_string());
                args.push(features.join(","));
            }
            args
        }
        TemplateKind::PythonPep517 => use_flags
            .iter()
            .map(|f| format!("--config-setting={}=true", f))
            .collect(),
        TemplateKind::Gradle => use_flags.iter().map(|f| format!("-P{}=true", f)).collect(),
        TemplateKind::Custom => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_use_list() {
        for kind in TemplateKind::ALL {
            assert!(translate(kind, &[]).is_empty(), "{kind}");
        }
    }

    #[test]
    fn test_meson_generic() {
        assert_eq!(
            translate(TemplateKind::Meson, &flags(&["lto", "docs"])),
            flags(&["-Dlto=true", "-Ddocs=true"])
        );
    }

    #[test]
    fn test_cmake_aliases_and_generic() {
        assert_eq!(
            translate(TemplateKind::Cmake, &flags(&["shared", "zlib_compat"])),
            flags(&["-DBUILD_SHARED_LIBS=ON", "-DZLIB_COMPAT=ON"])
        );
    }

    #[test]
    fn test_autotools_shared_expands() {
        assert_eq!(
            translate(TemplateKind::Autotools, &flags(&["shared", "nls"])),
            flags(&["--enable-shared", "--disable-static", "--enable-nls"])
        );
    }

    #[test]
    fn test_cargo_features_joined() {
        assert_eq!(
            translate(TemplateKind::Cargo, &flags(&["tls", "lto", "json"])),
            flags(&["--config=profile.release.lto=true", "--features", "tls,json"])
        );
    }

    #[test]
    fn test_optimizations_alias() {
        let opt = flags(&["optimizations"]);
        assert_eq!(
            translate(TemplateKind::Cmake, &opt),
            flags(&["-DCMAKE_INTERPROCEDURAL_OPTIMIZATION=ON"])
        );
        assert_eq!(
            translate(TemplateKind::Autotools, &opt),
            flags(&["--enable-lto", "--enable-optimizations"])
        );
        assert_eq!(
            translate(TemplateKind::Cargo, &opt),
            flags(&["--config=profile.release.lto=true"])
        );
        assert_eq!(translate(TemplateKind::Meson, &opt), flags(&["-Doptimizations=true"]));
    }

    #[test]
    fn test_gradle_properties() {
        assert_eq!(
            translate(TemplateKind::Gradle, &flags(&["native"])),
            flags(&["-Pnative=true"])
        );
    }

    #[test]
    fn test_custom_ignores_flags() {
        assert!(translate(TemplateKind::Custom, &flags(&["lto"])).is_empty());
    }
}
