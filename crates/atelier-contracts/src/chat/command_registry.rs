/// A slash command as shown by `/help`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandHelp {
    pub usage: &'static str,
    pub summary: &'static str,
}

const fn help(usage: &'static str, summary: &'static str) -> CommandHelp {
    CommandHelp { usage, summary }
}

pub const SESSION_COMMANDS: &[CommandHelp] = &[
    help("/prompt <text>", "set the prompt"),
    help("/negative [text]", "set or clear what to leave out"),
    help("/style [label]", "pick a style preset (empty for none)"),
    help("/ratio <w:h>", "aspect ratio: 1:1, 16:9, 9:16, 4:3 or 3:4"),
    help("/count <1-4>", "number of images"),
    help("/attach <path>", "attach a reference image"),
    help("/detach", "remove the reference image"),
    help("/generate [text]", "generate (plain text does the same)"),
    help("/status", "show the current form and results"),
    help("/save [n|id ...]", "save results to the gallery"),
    help("/export [n|id ...]", "write results to the export directory"),
    help("/outdir <path>", "set the export directory"),
    help("/gallery", "list the gallery"),
    help("/search [text]", "filter the gallery by prompt"),
    help("/favorites", "toggle favorites-only"),
    help("/fav <id ...>", "toggle favorite on gallery items"),
    help("/rm <id ...>", "remove gallery items"),
    help("/styles", "list style presets"),
    help("/theme", "toggle light/dark"),
    help("/quit", "leave the session"),
];
