//! Harness assembly
//!
//! Builds the source text actually handed to an execution context: the
//! fixed assertion helpers first, then the test's declared includes in
//! order, then the test body. The helper texts are opaque to the engine and
//! prepended verbatim.

use crate::metadata::Variant;

/// Assertion helpers every non-raw test can rely on. Defines the
/// `Test262Error` assertion protocol and the `assert` namespace.
pub const ASSERT_PRELUDE: &str = r#"
function Test262Error(message) {
  this.message = message || "";
}
Test262Error.prototype.toString = function () {
  return "Test262Error: " + this.message;
};
Test262Error.thrower = function (message) {
  throw new Test262Error(message);
};
var $ERROR = Test262Error.thrower;

function $DONOTEVALUATE() {
  throw "Test262: This statement should not be evaluated.";
}

function assert(mustBeTrue, message) {
  if (mustBeTrue === true) {
    return;
  }
  if (message === undefined) {
    message = "Expected true but got " + String(mustBeTrue);
  }
  Test262Error.thrower(message);
}

assert._isSameValue = function (a, b) {
  if (a === b) {
    // +0 and -0 compare equal but are not the same value.
    return a !== 0 || 1 / a === 1 / b;
  }
  // NaN is the same value as NaN.
  return a !== a && b !== b;
};

assert.sameValue = function (actual, expected, message) {
  if (assert._isSameValue(actual, expected)) {
    return;
  }
  message = (message === undefined ? "" : message + " ");
  Test262Error.thrower(
    message + "Expected SameValue(" + String(actual) + ", " + String(expected) + ") to be true"
  );
};

assert.notSameValue = function (actual, unexpected, message) {
  if (!assert._isSameValue(actual, unexpected)) {
    return;
  }
  message = (message === undefined ? "" : message + " ");
  Test262Error.thrower(
    message + "Expected SameValue(" + String(actual) + ", " + String(unexpected) + ") to be false"
  );
};

assert.throws = function (expectedErrorConstructor, func, message) {
  message = (message === undefined ? "" : message + " ");
  if (typeof func !== "function") {
    Test262Error.thrower(message + "assert.throws requires a function");
  }
  try {
    func();
  } catch (thrown) {
    if (typeof thrown !== "object" || thrown === null) {
      Test262Error.thrower(message + "Thrown value was not an object");
    }
    if (thrown.constructor !== expectedErrorConstructor) {
      Test262Error.thrower(
        message + "Expected a " + expectedErrorConstructor.name + " but got a different error"
      );
    }
    return;
  }
  Test262Error.thrower(
    message + "Expected a " + expectedErrorConstructor.name + " to be thrown but no exception was thrown"
  );
};
"#;

/// Done-protocol helper injected for `async` tests. The host watches for
/// the completion line on stdout.
pub const DONE_PRINT_HANDLE: &str = r#"
function __consolePrintHandle__(msg) {
  print(msg);
}

function $DONE(error) {
  if (error) {
    if (typeof error === "object" && error !== null && "name" in error) {
      __consolePrintHandle__("Test262:AsyncTestFailure:" + error.name + ": " + error.message);
    } else {
      __consolePrintHandle__("Test262:AsyncTestFailure:Test262Error: " + String(error));
    }
  } else {
    __consolePrintHandle__("Test262:AsyncTestComplete");
  }
}
"#;

/// Marker the host looks for on stdout to treat an async run as complete.
pub const ASYNC_COMPLETE_MARKER: &str = "Test262:AsyncTestComplete";

/// Marker prefix for an async run that reported failure through `$DONE`.
pub const ASYNC_FAILURE_PREFIX: &str = "Test262:AsyncTestFailure:";

/// Assemble the final source for one (test, variant) run.
///
/// Fixed order: assertion helpers, declared includes, test body. Strict
/// variants prepend the directive prologue ahead of everything so it
/// governs the whole script. `Raw` bodies are returned verbatim. Module
/// sources are already strict by construction and get no wrapper.
pub fn assemble(body: &str, includes: &str, variant: Variant, is_async: bool) -> String {
    if variant == Variant::Raw {
        return body.to_string();
    }

    let mut source = String::new();
    if variant == Variant::Strict {
        source.push_str("\"use strict\";\n");
    }
    source.push_str(ASSERT_PRELUDE);
    if is_async {
        source.push_str(DONE_PRINT_HANDLE);
    }
    source.push_str(includes);
    if !source.ends_with('\n') {
        source.push('\n');
    }
    source.push_str(body);
    source
}
