use clap::{Arg, ArgMatches, ColorChoice, Command};

use crate::svid::SvidShifts;

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: {
                Command::new("gnss-simcast")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("Loopback distribution daemon for simulated GNSS positioning data")
                    .color(ColorChoice::Always)
                    .next_help_heading("Satellite identifier encoding")
                    .arg(
                        Arg::new("svid-shift")
                            .long("svid-shift")
                            .value_name("BITS")
                            .help("Bit offset of the per-constellation satellite index in packed identifiers. Must match the consuming platform's status encoding contract. Default is 8."),
                    )
                    .arg(
                        Arg::new("constellation-shift")
                            .long("constellation-shift")
                            .value_name("BITS")
                            .help("Bit offset of the constellation type in packed identifiers. Must match the consuming platform's status encoding contract. Default is 4."),
                    )
                    .get_matches()
            },
        }
    }

    /// Identifier packing layout, possibly overridden by user
    pub fn svid_shifts(&self) -> SvidShifts {
        let defaults = SvidShifts::default();

        SvidShifts {
            svid_shift: self.parsed_shift("svid-shift", defaults.svid_shift),
            constellation_shift: self
                .parsed_shift("constellation-shift", defaults.constellation_shift),
        }
    }

    fn parsed_shift(&self, name: &str, default: u32) -> u32 {
        match self.matches.get_one::<String>(name) {
            Some(value) => shift_bits(name, value),
            None => default,
        }
    }
}

/// Shifts are applied to 32 bit identifiers, so anything at or above
/// 32 bits is rejected here rather than surfacing mid-update.
fn shift_bits(name: &str, value: &str) -> u32 {
    let bits: u32 = value
        .parse()
        .unwrap_or_else(|e| panic!("invalid --{} value \"{}\": {}", name, value, e));

    if bits >= 32 {
        panic!(
            "invalid --{} value \"{}\": shift must be below 32 bits",
            name, value
        );
    }

    bits
}
