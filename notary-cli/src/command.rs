//! Line commands accepted by `notary session` on stdin.

use std::path::PathBuf;
use std::str::FromStr;

use notary_core::{Color, Point};

const DEFAULT_COLOR: Color = Color::BLACK;
const DEFAULT_STROKE: f32 = 2.0;

pub const HELP: &str = "\
commands:
  draw <page> <x,y> <x,y>... [#rrggbb] [width]   freehand stroke
  text <page> <x> <y> <size> <#rrggbb> <text...> text annotation
  clear [page]                                   clear a page (default: current)
  page <n>                                       show page n
  render <file.png>                              save the current page
  export <file.jsonl>                            save the operation journal
  status                                         session status and participants
  start                                          join the room again
  leave                                          leave the room
  help                                           this text
  quit                                           leave and exit";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("Missing {0}")]
    Missing(&'static str),
    #[error("Invalid {what}: '{value}'")]
    Invalid { what: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Draw {
        page: u32,
        path: Vec<Point>,
        color: Color,
        width: f32,
    },
    Text {
        page: u32,
        x: f32,
        y: f32,
        size: f32,
        color: Color,
        value: String,
    },
    Clear(Option<u32>),
    Page(u32),
    Render(PathBuf),
    Export(PathBuf),
    Status,
    Start,
    Leave,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;

        match name {
            "draw" => {
                let page = parse(words.next(), "page")?;
                let mut path = Vec::new();
                let mut color = DEFAULT_COLOR;
                let mut width = DEFAULT_STROKE;
                for word in words {
                    if word.starts_with('#') {
                        color = parse(Some(word), "color")?;
                    } else if word.contains(',') {
                        path.push(parse_point(word)?);
                    } else {
                        width = parse(Some(word), "width")?;
                    }
                }
                if path.is_empty() {
                    return Err(CommandError::Missing("path points"));
                }
                Ok(Command::Draw {
                    page,
                    path,
                    color,
                    width,
                })
            }
            "text" => {
                let page = parse(words.next(), "page")?;
                let x = parse(words.next(), "x")?;
                let y = parse(words.next(), "y")?;
                let size = parse(words.next(), "font size")?;
                let color = parse(words.next(), "color")?;
                let value = words.collect::<Vec<_>>().join(" ");
                if value.is_empty() {
                    return Err(CommandError::Missing("text"));
                }
                Ok(Command::Text {
                    page,
                    x,
                    y,
                    size,
                    color,
                    value,
                })
            }
            "clear" => Ok(Command::Clear(
                words.next().map(|w| parse(Some(w), "page")).transpose()?,
            )),
            "page" => Ok(Command::Page(parse(words.next(), "page")?)),
            "render" => Ok(Command::Render(path_arg(words.next(), "output file")?)),
            "export" => Ok(Command::Export(path_arg(words.next(), "output file")?)),
            "status" | "who" => Ok(Command::Status),
            "start" | "join" => Ok(Command::Start),
            "leave" => Ok(Command::Leave),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse<T: FromStr>(word: Option<&str>, what: &'static str) -> Result<T, CommandError> {
    let word = word.ok_or(CommandError::Missing(what))?;
    word.parse().map_err(|_| CommandError::Invalid {
        what,
        value: word.to_string(),
    })
}

fn parse_point(word: &str) -> Result<Point, CommandError> {
    let invalid = || CommandError::Invalid {
        what: "point",
        value: word.to_string(),
    };
    let (x, y) = word.split_once(',').ok_or_else(invalid)?;
    let x = x.parse().map_err(|_| invalid())?;
    let y = y.parse().map_err(|_| invalid())?;
    Ok(Point::new(x, y))
}

fn path_arg(word: Option<&str>, what: &'static str) -> Result<PathBuf, CommandError> {
    word.map(PathBuf::from).ok_or(CommandError::Missing(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_draw() {
        let cmd: Command = "draw 1 10,10 20,25.5 #ff0000 3".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Draw {
                page: 1,
                path: vec![Point::new(10.0, 10.0), Point::new(20.0, 25.5)],
                color: Color::RED,
                width: 3.0,
            }
        );
    }

    #[test]
    fn test_parse_draw_defaults() {
        let Command::Draw { color, width, .. } = "draw 2 1,1 2,2".parse::<Command>().unwrap() else {
            panic!("expected draw");
        };
        assert_eq!(color, Color::BLACK);
        assert_eq!(width, DEFAULT_STROKE);
    }

    #[test]
    fn test_draw_requires_points() {
        assert_eq!(
            "draw 1 #ff0000".parse::<Command>(),
            Err(CommandError::Missing("path points"))
        );
        assert!(matches!(
            "draw 1 10;10".parse::<Command>(),
            Err(CommandError::Invalid { what: "width", .. })
        ));
        assert!(matches!(
            "draw 1 a,b".parse::<Command>(),
            Err(CommandError::Invalid { what: "point", .. })
        ));
    }

    #[test]
    fn test_parse_text_keeps_spaces() {
        let cmd: Command = "text 1 72 700 12 #000000 Sign   here please".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Text {
                page: 1,
                x: 72.0,
                y: 700.0,
                size: 12.0,
                color: Color::BLACK,
                value: "Sign here please".into(),
            }
        );
        assert_eq!(
            "text 1 72 700 12 #000000".parse::<Command>(),
            Err(CommandError::Missing("text"))
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("clear".parse::<Command>(), Ok(Command::Clear(None)));
        assert_eq!("clear 3".parse::<Command>(), Ok(Command::Clear(Some(3))));
        assert_eq!("page 2".parse::<Command>(), Ok(Command::Page(2)));
        assert_eq!(
            "render out.png".parse::<Command>(),
            Ok(Command::Render("out.png".into()))
        );
        assert_eq!(
            "export log.jsonl".parse::<Command>(),
            Ok(Command::Export("log.jsonl".into()))
        );
        assert_eq!("  status ".parse::<Command>(), Ok(Command::Status));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!(
            "erase 1".parse::<Command>(),
            Err(CommandError::Unknown("erase".into()))
        );
        assert_eq!(
            "page".parse::<Command>(),
            Err(CommandError::Missing("page"))
        );
        assert!(matches!(
            "page two".parse::<Command>(),
            Err(CommandError::Invalid { what: "page", .. })
        ));
    }
}
