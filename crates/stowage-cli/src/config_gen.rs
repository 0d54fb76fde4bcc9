use std::path::PathBuf;

use stowage_core::config;

pub(crate) fn run_config_generate(dest: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match dest {
        Some(d) => PathBuf::from(d),
        None => pick_config_location()?,
    };

    if path.exists() {
        return Err(format!("file already exists: {}", path.display()).into());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, config::minimal_config_template())?;
    println!("Config written to: {}", path.display());
    println!("Edit it to set the schedule, source directory, bucket and recipient.");
    Ok(())
}

fn pick_config_location() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let search_paths = config::default_config_search_paths();
    let hint = |level: &str| match level {
        "project" => "Local directory (stowage.yaml next to where you run it)",
        "user" => "User config (personal backups)",
        _ => "System-wide (servers, systemd units)",
    };

    eprintln!("Where should the config file live?");
    for (i, (path, level)) in search_paths.iter().enumerate() {
        eprintln!("  [{}] {}", i + 1, path.display());
        eprintln!("      {}", hint(level));
    }
    eprint!("Choice [1]: ");
    std::io::Write::flush(&mut std::io::stderr())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        return Ok(search_paths[0].0.clone());
    }

    let n: usize = input
        .parse()
        .map_err(|_| format!("invalid choice: '{input}'"))?;
    search_paths
        .get(n.wrapping_sub(1))
        .map(|(path, _)| path.clone())
        .ok_or_else(|| format!("choice out of range: {n}").into())
}
