//! Mock version of an output sink;
use mockall::mock;

use std::io;

use xml_template::item::xml::Sink;

mock! {
    pub Output {}
    impl Sink for Output {
        fn write_chunk(&mut self, chunk: &str) -> io::Result<bool>;
        fn drain(&mut self) -> io::Result<()>;
        fn end(&mut self) -> io::Result<()>;
    }
}
