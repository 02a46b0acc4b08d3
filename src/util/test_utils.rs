// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::sync::Mutex;

use crate::util::logger::{Logger, Record};

pub struct TestLogger {
	pub lines: Mutex<Vec<String>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		TestLogger {
			lines: Mutex::new(Vec::new()),
		}
	}
}

impl Logger for TestLogger {
	fn log(&self, record: &Record) {
		self.lines.lock().unwrap().push(format!("{} {} {}", record.level, record.module_path, record.args));
	}
}
