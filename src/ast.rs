/// One parsed command line: "prog arg... [< infile] [> outfile] [&]"
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub args: Vec<String>,
    pub infile: Option<String>,
    pub outfile: Option<String>,
    pub background: bool,
}

impl Command {
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}
