use amity_core::config::{DEFAULT_DATA_DIR, DEFAULT_PROFILE_URL};
use amity_scanner::driver::DEFAULT_NEXT_SELECTOR;
use amity_scanner::extract::{DEFAULT_CONTAINER_SELECTOR, DEFAULT_ITEM_SELECTOR};
use clap::{arg, command};
use std::path::PathBuf;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

fn data_dir_arg() -> clap::Arg {
    arg!(-d --"data-dir" <PATH>)
        .required(false)
        .help("Directory holding the amity database, snapshots and cookies")
        .default_value(DEFAULT_DATA_DIR)
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("amity")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("amity")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(arg!(-v --"verbose" "Log pipeline progress to stderr").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the amity data directory and database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the amity data directory")
                        .default_value(DEFAULT_DATA_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("friends")
                .about(
                    "Collects a user's friend list by scrolling it to the end and stores it in \
                the database",
                )
                .arg(
                    arg!(-u --"user" <ID>)
                        .required(true)
                        .help("Identifier of the user whose friends are collected"),
                )
                .arg(
                    arg!(-c --"crawl")
                        .required(false)
                        .help("Queue every discovered friend for a later crawl")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-n --"target" <COUNT>)
                        .required(false)
                        .help("Stop once this many friends were collected (0 = all)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(--"cookies" <PATH>)
                        .required(false)
                        .help("JSON cookie file (default: <data-dir>/cookies.json when present)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"profile-url" <TEMPLATE>)
                        .required(false)
                        .help("Friend listing URL, {id} is replaced with the user")
                        .default_value(DEFAULT_PROFILE_URL),
                )
                .arg(
                    arg!(--"max-scrolls" <NUM>)
                        .required(false)
                        .help("Upper bound on scroll cycles")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(--"stable-rounds" <NUM>)
                        .required(false)
                        .help("Consecutive cycles without new friends before stopping")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"pause-ms" <MILLIS>)
                        .required(false)
                        .help("Wait between scrolls so new content can load")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1500"),
                )
                .arg(
                    arg!(--"deadline" <SECONDS>)
                        .required(false)
                        .help("Give up scrolling after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"container-selector" <CSS>)
                        .required(false)
                        .help("CSS selector of the friend list container")
                        .default_value(DEFAULT_CONTAINER_SELECTOR),
                )
                .arg(
                    arg!(--"item-selector" <CSS>)
                        .required(false)
                        .help("CSS selector of a friend's name inside the container")
                        .default_value(DEFAULT_ITEM_SELECTOR),
                )
                .arg(
                    arg!(--"next-selector" <CSS>)
                        .required(false)
                        .help("CSS selector of the link that loads more friends")
                        .default_value(DEFAULT_NEXT_SELECTOR),
                )
                .arg(data_dir_arg()),
        )
        .subcommand(
            command!("show")
                .about("Shows a stored user with their friends")
                .arg(
                    arg!(-u --"user" <ID>)
                        .required(true)
                        .help("Identifier of the user"),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the friends as JSON")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(data_dir_arg()),
        )
        .subcommand(
            command!("queue")
                .about("Lists profiles waiting to be crawled")
                .arg(
                    arg!(--"pop")
                        .required(false)
                        .help("Remove and print the oldest queued profile")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(data_dir_arg()),
        )
}
