use std::io::BufRead;
use std::rc::Rc;

/// One line of source text. Every token holds a reference to the line it
/// came from so errors can always name a file and line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub filename: Rc<str>,
    pub lineno: usize,
    pub text: String,
}

pub trait LineSource {
    fn pos(&self) -> (Rc<str>, usize);
    fn next_line(&mut self) -> std::io::Result<Option<Rc<Line>>>;
}

type PromptFn = Box<dyn FnMut() -> std::io::Result<()>>;

/// Reads lines from any `BufRead`, tagging each with the filename and a
/// 1-based line number. An optional prompt callback runs before each read
/// (the REPL prints `> ` through it).
pub struct ReaderLineSource<R> {
    filename: Rc<str>,
    reader: R,
    prompt: Option<PromptFn>,
    lineno: usize,
    done: bool,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(filename: &str, reader: R) -> Self {
        ReaderLineSource {
            filename: filename.into(),
            reader,
            prompt: None,
            lineno: 0,
            done: false,
        }
    }

    pub fn with_prompt(filename: &str, reader: R, prompt: PromptFn) -> Self {
        ReaderLineSource {
            prompt: Some(prompt),
            ..Self::new(filename, reader)
        }
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn pos(&self) -> (Rc<str>, usize) {
        (self.filename.clone(), self.lineno)
    }

    fn next_line(&mut self) -> std::io::Result<Option<Rc<Line>>> {
        if self.done {
            return Ok(None);
        }
        if let Some(prompt) = self.prompt.as_mut() {
            prompt()?;
        }
        let mut buf = String::new();
        let read = self.reader.read_line(&mut buf)?;
        if read == 0 {
            self.done = true;
            return Ok(None);
        }
        self.lineno += 1;
        Ok(Some(Rc::new(Line {
            filename: self.filename.clone(),
            lineno: self.lineno,
            text: buf.trim_end().to_string(),
        })))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lines_are_numbered_from_one() {
        let mut src = ReaderLineSource::new("test", "a\nb\nc".as_bytes());
        let a = src.next_line().unwrap().unwrap();
        assert_eq!((a.filename.as_ref(), a.lineno, a.text.as_str()), ("test", 1, "a"));
        let b = src.next_line().unwrap().unwrap();
        assert_eq!(b.lineno, 2);
        let c = src.next_line().unwrap().unwrap();
        assert_eq!((c.lineno, c.text.as_str()), (3, "c"));
        assert!(src.next_line().unwrap().is_none());
        assert!(src.next_line().unwrap().is_none());
    }

    #[test]
    fn test_trailing_whitespace_is_trimmed() {
        let mut src = ReaderLineSource::new("test", "a b  \t\n".as_bytes());
        let line = src.next_line().unwrap().unwrap();
        assert_eq!(line.text, "a b");
    }

    #[test]
    fn test_prompt_runs_before_each_line() {
        use std::cell::Cell;
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let mut src = ReaderLineSource::with_prompt(
            "test",
            "a\nb\n".as_bytes(),
            Box::new(move || {
                seen.set(seen.get() + 1);
                Ok(())
            }),
        );
        src.next_line().unwrap().unwrap();
        src.next_line().unwrap().unwrap();
        assert!(src.next_line().unwrap().is_none());
        assert_eq!(count.get(), 3);
    }
}
