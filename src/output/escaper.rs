use std::io;

/// Writer that backslash-escapes `"` for DOT labels.
pub struct Escaper<W>
where
    W: io::Write,
{
    pub writer: W,
}


impl<W> Escaper<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> Self {
        Escaper { writer }
    }
}


impl<W> io::Write for Escaper<W>
where
    W: io::Write
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        for &c in buf
        {
            if c == b'"' || c == b'\\'
            {
                self.writer.write_all(b"\\")?;
            }
            self.writer.write_all(&[c])?;
        }
        Ok( buf.len() )
    }

    fn flush(&mut self) -> Result<(), std::io::Error>
    {
        self.writer.flush()
    }
}
