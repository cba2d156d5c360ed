// Purpose: System package manager identifiers and install-command synthesis.

use clap::ValueEnum;
use serde::Deserialize;

/// Identifiers enter the system either from a build-spec file (serde) or
/// from the CLI override (clap); an unknown name fails at that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PkgManager {
    Apt,
    Dpkg,
    Yum,
}

/// Synthesize the shell commands that install `pkgs` with the given package
/// manager. For `dpkg`, `pkgs` is a list of `.deb` URLs.
pub fn install(pkg_manager: PkgManager, pkgs: &[String], opts: Option<&str>) -> String {
    match pkg_manager {
        PkgManager::Apt => apt_install(pkgs, opts),
        PkgManager::Dpkg => dpkg_install(pkgs, opts),
        PkgManager::Yum => yum_install(pkgs, opts),
    }
}

/// Update, install and clean up with apt-get. Packages are sorted so the
/// generated text is stable regardless of input order.
pub fn apt_install(pkgs: &[String], opts: Option<&str>) -> String {
    let opts = opts.unwrap_or("-q --no-install-recommends");
    format!(
        "apt-get update -qq\napt-get install -y {} \\\n    {}\nrm -rf /var/lib/apt/lists/*",
        opts,
        sorted(pkgs).join(" \\\n    ")
    )
}

/// Download each `.deb` to a temporary file, install it and remove the file,
/// then fix up missing dependencies and clean the package lists.
pub fn dpkg_install(urls: &[String], opts: Option<&str>) -> String {
    let opts = opts.unwrap_or("");
    let mut out = String::new();
    for url in urls {
        out.push_str(&format!(
            "curl -fsSL --retry 5 -o /tmp/toinstall.deb {}\n",
            url
        ));
        if opts.is_empty() {
            out.push_str("dpkg -i /tmp/toinstall.deb\n");
        } else {
            out.push_str(&format!("dpkg -i {} /tmp/toinstall.deb\n", opts));
        }
        out.push_str("rm /tmp/toinstall.deb\n");
    }
    out.push_str(
        "apt-get update -qq\napt-get install -y -q --fix-missing\nrm -rf /var/lib/apt/lists/*",
    );
    out
}

/// Install and clean up with yum. `yum install -y` refreshes metadata itself,
/// so there is no separate update step.
pub fn yum_install(pkgs: &[String], opts: Option<&str>) -> String {
    let opts = opts.unwrap_or("-q");
    format!(
        "yum install -y {} \\\n    {}\nyum clean all\nrm -rf /var/cache/yum/*",
        opts,
        sorted(pkgs).join(" \\\n    ")
    )
}

fn sorted(pkgs: &[String]) -> Vec<&str> {
    let mut pkgs: Vec<&str> = pkgs.iter().map(String::as_str).collect();
    pkgs.sort_unstable();
    pkgs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkgs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_apt_install_sorts_packages() {
        let cmd = apt_install(&pkgs(&["wget", "curl", "git"]), None);
        assert_eq!(
            cmd,
            "apt-get update -qq\n\
             apt-get install -y -q --no-install-recommends \\\n    \
             curl \\\n    \
             git \\\n    \
             wget\n\
             rm -rf /var/lib/apt/lists/*"
        );
    }

    #[test]
    fn test_apt_install_sorted_regardless_of_input_order() {
        let a = apt_install(&pkgs(&["zsh", "apt-utils", "curl"]), None);
        let b = apt_install(&pkgs(&["curl", "zsh", "apt-utils"]), None);
        assert_eq!(a, b);
        let install_line = a.lines().nth(1).unwrap();
        assert!(install_line.contains("apt-utils"));
    }

    #[test]
    fn test_apt_install_custom_opts() {
        let cmd = apt_install(&pkgs(&["curl"]), Some("--yes"));
        assert!(cmd.contains("apt-get install -y --yes \\"));
        assert!(!cmd.contains("--no-install-recommends"));
    }

    #[test]
    fn test_yum_install() {
        let cmd = yum_install(&pkgs(&["python", "curl"]), None);
        assert_eq!(
            cmd,
            "yum install -y -q \\\n    \
             curl \\\n    \
             python\n\
             yum clean all\n\
             rm -rf /var/cache/yum/*"
        );
    }

    #[test]
    fn test_dpkg_install_per_url_sequence() {
        let cmd = dpkg_install(
            &pkgs(&["http://a.deb", "http://b.deb"]),
            None,
        );
        let expected = "curl -fsSL --retry 5 -o /tmp/toinstall.deb http://a.deb\n\
             dpkg -i /tmp/toinstall.deb\n\
             rm /tmp/toinstall.deb\n\
             curl -fsSL --retry 5 -o /tmp/toinstall.deb http://b.deb\n\
             dpkg -i /tmp/toinstall.deb\n\
             rm /tmp/toinstall.deb\n\
             apt-get update -qq\n\
             apt-get install -y -q --fix-missing\n\
             rm -rf /var/lib/apt/lists/*";
        assert_eq!(cmd, expected);
    }

    #[test]
    fn test_dpkg_install_opts() {
        let cmd = dpkg_install(&pkgs(&["http://a.deb"]), Some("--force-confold"));
        assert!(cmd.contains("dpkg -i --force-confold /tmp/toinstall.deb"));
    }

    #[test]
    fn test_install_dispatch() {
        let p = pkgs(&["curl"]);
        assert!(install(PkgManager::Apt, &p, None).starts_with("apt-get update"));
        assert!(install(PkgManager::Yum, &p, None).starts_with("yum install"));
        assert!(install(PkgManager::Dpkg, &p, None).starts_with("curl -fsSL"));
    }
}
