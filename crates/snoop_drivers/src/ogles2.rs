//! OGLES2 driver family
//!
//! Interface-table family: the library hands every client its own
//! interface, whose function table is patched when the interface is
//! created. After each wrapped call the engine polls `glGetError` and
//! queues anything but `GL_NO_ERROR`; the client's own `glGetError` then
//! drains that queue first.

use snoop_core::descriptor::FunctionDescriptor as F;
use snoop_core::{Call, ClientHandle, DrawCall, EntryPoint, FamilyDescriptor, Interceptor, Topology};

/// `GL_NO_ERROR`
pub const GL_NO_ERROR: u32 = 0;

/// `GL_FRAMEBUFFER_COMPLETE`
pub const GL_FRAMEBUFFER_COMPLETE: u32 = 0x8CD5;

snoop_core::entry_points! {
    /// OGLES2 entry points
    pub enum Ogles2Fn in OGLES2_FUNCTIONS {
        AglCreateContext => F::null_check("aglCreateContext"),
        AglCreateContextTags => F::null_check("aglCreateContextTags"),
        AglCreateContext2 => F::null_check("aglCreateContext2"),
        AglDestroyContext => F::plain("aglDestroyContext"),
        AglMakeCurrent => F::plain("aglMakeCurrent"),
        AglSwapBuffers => F::frame("aglSwapBuffers"),
        AglSetBitmap => F::plain("aglSetBitmap"),
        AglSetParams2 => F::plain("aglSetParams2"),
        GlActiveTexture => F::plain("glActiveTexture"),
        GlAttachShader => F::plain("glAttachShader"),
        GlBindAttribLocation => F::plain("glBindAttribLocation"),
        GlBindBuffer => F::plain("glBindBuffer"),
        GlBindFramebuffer => F::plain("glBindFramebuffer"),
        GlBindRenderbuffer => F::plain("glBindRenderbuffer"),
        GlBindTexture => F::plain("glBindTexture"),
        GlBlendColor => F::plain("glBlendColor"),
        GlBlendEquation => F::plain("glBlendEquation"),
        GlBlendEquationSeparate => F::plain("glBlendEquationSeparate"),
        GlBlendFunc => F::plain("glBlendFunc"),
        GlBlendFuncSeparate => F::plain("glBlendFuncSeparate"),
        GlBufferData => F::plain("glBufferData"),
        GlBufferSubData => F::plain("glBufferSubData"),
        GlCheckFramebufferStatus => F::status("glCheckFramebufferStatus", GL_FRAMEBUFFER_COMPLETE),
        GlClear => F::plain("glClear"),
        GlClearColor => F::plain("glClearColor"),
        GlClearDepthf => F::plain("glClearDepthf"),
        GlClearStencil => F::plain("glClearStencil"),
        GlColorMask => F::plain("glColorMask"),
        GlCompileShader => F::plain("glCompileShader"),
        GlCompressedTexImage2D => F::plain("glCompressedTexImage2D"),
        GlCompressedTexSubImage2D => F::plain("glCompressedTexSubImage2D"),
        GlCopyTexImage2D => F::plain("glCopyTexImage2D"),
        GlCopyTexSubImage2D => F::plain("glCopyTexSubImage2D"),
        GlCreateProgram => F::plain("glCreateProgram"),
        GlCreateShader => F::plain("glCreateShader"),
        GlCullFace => F::plain("glCullFace"),
        GlDeleteBuffers => F::plain("glDeleteBuffers"),
        GlDeleteFramebuffers => F::plain("glDeleteFramebuffers"),
        GlDeleteProgram => F::plain("glDeleteProgram"),
        GlDeleteRenderbuffers => F::plain("glDeleteRenderbuffers"),
        GlDeleteShader => F::plain("glDeleteShader"),
        GlDeleteTextures => F::plain("glDeleteTextures"),
        GlDepthFunc => F::plain("glDepthFunc"),
        GlDepthMask => F::plain("glDepthMask"),
        GlDepthRangef => F::plain("glDepthRangef"),
        GlDetachShader => F::plain("glDetachShader"),
        GlDisable => F::plain("glDisable"),
        GlDisableVertexAttribArray => F::plain("glDisableVertexAttribArray"),
        GlDrawArrays => F::draw("glDrawArrays"),
        GlDrawElements => F::draw("glDrawElements"),
        GlEnable => F::plain("glEnable"),
        GlEnableVertexAttribArray => F::plain("glEnableVertexAttribArray"),
        GlFinish => F::plain("glFinish"),
        GlFlush => F::plain("glFlush"),
        GlFramebufferRenderbuffer => F::plain("glFramebufferRenderbuffer"),
        GlFramebufferTexture2D => F::plain("glFramebufferTexture2D"),
        GlFrontFace => F::plain("glFrontFace"),
        GlGenBuffers => F::plain("glGenBuffers"),
        GlGenerateMipmap => F::plain("glGenerateMipmap"),
        GlGenFramebuffers => F::plain("glGenFramebuffers"),
        GlGenRenderbuffers => F::plain("glGenRenderbuffers"),
        GlGenTextures => F::plain("glGenTextures"),
        GlGetActiveAttrib => F::plain("glGetActiveAttrib"),
        GlGetActiveUniform => F::plain("glGetActiveUniform"),
        GlGetAttachedShaders => F::plain("glGetAttachedShaders"),
        GlGetAttribLocation => F::plain("glGetAttribLocation"),
        GlGetBooleanv => F::plain("glGetBooleanv"),
        GlGetBufferParameteriv => F::plain("glGetBufferParameteriv"),
        GlGetError => F::plain("glGetError"),
        GlGetFloatv => F::plain("glGetFloatv"),
        GlGetFramebufferAttachmentParameteriv => F::plain("glGetFramebufferAttachmentParameteriv"),
        GlGetIntegerv => F::plain("glGetIntegerv"),
        GlGetProgramiv => F::plain("glGetProgramiv"),
        GlGetProgramInfoLog => F::plain("glGetProgramInfoLog"),
        GlGetRenderbufferParameteriv => F::plain("glGetRenderbufferParameteriv"),
        GlGetShaderiv => F::plain("glGetShaderiv"),
        GlGetShaderInfoLog => F::plain("glGetShaderInfoLog"),
        GlGetShaderPrecisionFormat => F::plain("glGetShaderPrecisionFormat"),
        GlGetShaderSource => F::plain("glGetShaderSource"),
        GlGetString => F::null_check("glGetString"),
        GlGetTexParameterfv => F::plain("glGetTexParameterfv"),
        GlGetTexParameteriv => F::plain("glGetTexParameteriv"),
        GlGetUniformfv => F::plain("glGetUniformfv"),
        GlGetUniformiv => F::plain("glGetUniformiv"),
        GlGetUniformLocation => F::plain("glGetUniformLocation"),
        GlGetVertexAttribfv => F::plain("glGetVertexAttribfv"),
        GlGetVertexAttribiv => F::plain("glGetVertexAttribiv"),
        GlGetVertexAttribPointerv => F::plain("glGetVertexAttribPointerv"),
        GlHint => F::plain("glHint"),
        GlIsBuffer => F::plain("glIsBuffer"),
        GlIsEnabled => F::plain("glIsEnabled"),
        GlIsFramebuffer => F::plain("glIsFramebuffer"),
        GlIsProgram => F::plain("glIsProgram"),
        GlIsRenderbuffer => F::plain("glIsRenderbuffer"),
        GlIsShader => F::plain("glIsShader"),
        GlIsTexture => F::plain("glIsTexture"),
        GlLineWidth => F::plain("glLineWidth"),
        GlLinkProgram => F::plain("glLinkProgram"),
        GlMapBufferOES => F::null_check("glMapBufferOES"),
        GlPixelStorei => F::plain("glPixelStorei"),
        GlPolygonOffset => F::plain("glPolygonOffset"),
        GlReadPixels => F::plain("glReadPixels"),
        GlReleaseShaderCompiler => F::plain("glReleaseShaderCompiler"),
        GlRenderbufferStorage => F::plain("glRenderbufferStorage"),
        GlSampleCoverage => F::plain("glSampleCoverage"),
        GlScissor => F::plain("glScissor"),
        GlShaderBinary => F::plain("glShaderBinary"),
        GlShaderSource => F::plain("glShaderSource"),
        GlStencilFunc => F::plain("glStencilFunc"),
        GlStencilFuncSeparate => F::plain("glStencilFuncSeparate"),
        GlStencilMask => F::plain("glStencilMask"),
        GlStencilMaskSeparate => F::plain("glStencilMaskSeparate"),
        GlStencilOp => F::plain("glStencilOp"),
        GlStencilOpSeparate => F::plain("glStencilOpSeparate"),
        GlTexImage2D => F::plain("glTexImage2D"),
        GlTexParameterf => F::plain("glTexParameterf"),
        GlTexParameterfv => F::plain("glTexParameterfv"),
        GlTexParameteri => F::plain("glTexParameteri"),
        GlTexParameteriv => F::plain("glTexParameteriv"),
        GlTexSubImage2D => F::plain("glTexSubImage2D"),
        GlUniform1f => F::plain("glUniform1f"),
        GlUniform1fv => F::plain("glUniform1fv"),
        GlUniform1i => F::plain("glUniform1i"),
        GlUniform1iv => F::plain("glUniform1iv"),
        GlUniform2f => F::plain("glUniform2f"),
        GlUniform2fv => F::plain("glUniform2fv"),
        GlUniform2i => F::plain("glUniform2i"),
        GlUniform2iv => F::plain("glUniform2iv"),
        GlUniform3f => F::plain("glUniform3f"),
        GlUniform3fv => F::plain("glUniform3fv"),
        GlUniform3i => F::plain("glUniform3i"),
        GlUniform3iv => F::plain("glUniform3iv"),
        GlUniform4f => F::plain("glUniform4f"),
        GlUniform4fv => F::plain("glUniform4fv"),
        GlUniform4i => F::plain("glUniform4i"),
        GlUniform4iv => F::plain("glUniform4iv"),
        GlUniformMatrix2fv => F::plain("glUniformMatrix2fv"),
        GlUniformMatrix3fv => F::plain("glUniformMatrix3fv"),
        GlUniformMatrix4fv => F::plain("glUniformMatrix4fv"),
        GlUnmapBufferOES => F::plain("glUnmapBufferOES"),
        GlUseProgram => F::plain("glUseProgram"),
        GlValidateProgram => F::plain("glValidateProgram"),
        GlVertexAttrib1f => F::plain("glVertexAttrib1f"),
        GlVertexAttrib1fv => F::plain("glVertexAttrib1fv"),
        GlVertexAttrib2f => F::plain("glVertexAttrib2f"),
        GlVertexAttrib2fv => F::plain("glVertexAttrib2fv"),
        GlVertexAttrib3f => F::plain("glVertexAttrib3f"),
        GlVertexAttrib3fv => F::plain("glVertexAttrib3fv"),
        GlVertexAttrib4f => F::plain("glVertexAttrib4f"),
        GlVertexAttrib4fv => F::plain("glVertexAttrib4fv"),
        GlVertexAttribPointer => F::plain("glVertexAttribPointer"),
        GlViewport => F::plain("glViewport"),
    }
}

/// The OGLES2 family
pub static OGLES2: FamilyDescriptor = FamilyDescriptor {
    name: "OGLES2",
    functions: OGLES2_FUNCTIONS,
    error_poll: Some(Ogles2Fn::GlGetError.id()),
    success_code: GL_NO_ERROR,
};

/// Topology of a GL primitive mode, `None` for an unknown mode
pub fn topology(mode: u32) -> Option<Topology> {
    match mode {
        0x0000 => Some(Topology::Points),
        0x0001 => Some(Topology::Lines),
        0x0002 => Some(Topology::LineLoop),
        0x0003 => Some(Topology::LineStrip),
        0x0004 => Some(Topology::Triangles),
        0x0005 => Some(Topology::TriangleStrip),
        0x0006 => Some(Topology::TriangleFan),
        _ => None,
    }
}

/// Mnemonic of a GL primitive mode
pub fn mode_name(mode: u32) -> &'static str {
    match mode {
        0x0000 => "GL_POINTS",
        0x0001 => "GL_LINES",
        0x0002 => "GL_LINE_LOOP",
        0x0003 => "GL_LINE_STRIP",
        0x0004 => "GL_TRIANGLES",
        0x0005 => "GL_TRIANGLE_STRIP",
        0x0006 => "GL_TRIANGLE_FAN",
        _ => "?",
    }
}

/// Mnemonic of a GL error code
pub fn error_name(code: u32) -> &'static str {
    match code {
        0x0000 => "GL_NO_ERROR",
        0x0500 => "GL_INVALID_ENUM",
        0x0501 => "GL_INVALID_VALUE",
        0x0502 => "GL_INVALID_OPERATION",
        0x0505 => "GL_OUT_OF_MEMORY",
        0x0506 => "GL_INVALID_FRAMEBUFFER_OPERATION",
        _ => "?",
    }
}

fn draw_call(mode: u32, count: i32) -> Option<DrawCall> {
    topology(mode).map(|t| DrawCall::new(t, count.max(0) as u64))
}

/// Intercept `glDrawArrays(mode, first, count)`
pub fn draw_arrays(
    interceptor: &Interceptor,
    client: ClientHandle,
    mode: u32,
    first: i32,
    count: i32,
    forward: impl FnOnce(EntryPoint),
) {
    interceptor.invoke(
        Call::new(client, Ogles2Fn::GlDrawArrays)
            .args(&format_args!("{}, {}, {}", mode_name(mode), first, count))
            .draw(draw_call(mode, count)),
        forward,
    );
}

/// Intercept `glDrawElements(mode, count, type, indices)`
pub fn draw_elements(
    interceptor: &Interceptor,
    client: ClientHandle,
    mode: u32,
    count: i32,
    index_type: u32,
    indices: usize,
    forward: impl FnOnce(EntryPoint),
) {
    interceptor.invoke(
        Call::new(client, Ogles2Fn::GlDrawElements)
            .args(&format_args!(
                "{}, {}, {:#x}, {:#x}",
                mode_name(mode),
                count,
                index_type,
                indices
            ))
            .draw(draw_call(mode, count)),
        forward,
    );
}

/// Intercept `glGetError()`, handing out deferred errors first
pub fn get_error(interceptor: &Interceptor, client: ClientHandle, forward: impl FnOnce(EntryPoint) -> u32) -> u32 {
    interceptor.invoke_error_poll(Call::new(client, Ogles2Fn::GlGetError), forward)
}

/// Intercept `aglSwapBuffers()`
pub fn swap_buffers(interceptor: &Interceptor, client: ClientHandle, forward: impl FnOnce(EntryPoint)) {
    interceptor.invoke(Call::new(client, Ogles2Fn::AglSwapBuffers), forward);
}
