/// This module provides the template-driven XML reader and writer.
pub mod xml;
